//! Verify-pin command - check an employee PIN without echoing it

use crate::client::{LoyaltyClient, VerifiedEmployee, VerifyPinResponse};
use crate::style::*;
use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use uuid::Uuid;

pub async fn run(url: &str, employee: Uuid) -> Result<()> {
    print_header("Employee PIN Check");

    let pin: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("  PIN")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.len() == 4 && input.chars().all(|c| c.is_ascii_digit()) {
                Ok(())
            } else {
                Err("PIN must be 4 digits")
            }
        })
        .interact()?;

    let client = LoyaltyClient::new(url);

    let resp = client.verify_pin(employee, &pin).await?;
    let employee = accepted(resp)?;
    print_success(&format!(
        "PIN accepted for {} ({})",
        style_cyan(&employee.name),
        employee.role
    ));
    Ok(())
}

fn accepted(resp: VerifyPinResponse) -> Result<VerifiedEmployee> {
    if !resp.valid {
        bail!("PIN rejected");
    }
    Ok(resp.employee)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(valid: bool) -> VerifyPinResponse {
        VerifyPinResponse {
            valid,
            employee: VerifiedEmployee {
                name: "Jonas".to_string(),
                role: "bartender".to_string(),
            },
        }
    }

    #[test]
    fn test_rejected_pin_is_an_error() {
        assert_eq!(accepted(response(true)).unwrap().name, "Jonas");
        let err = accepted(response(false)).unwrap_err();
        assert_eq!(err.to_string(), "PIN rejected");
    }
}

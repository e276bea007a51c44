pub mod config;
pub mod history;
pub mod leaderboard;
pub mod maintenance;
pub mod server;
pub mod status;
pub mod transfer;
pub mod verify_pin;

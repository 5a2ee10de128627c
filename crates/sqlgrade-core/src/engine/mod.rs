pub mod capture;
pub mod runner;

pub mod dispatch;
pub mod optimizer;
pub mod simulator;

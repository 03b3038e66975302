pub mod clock;
pub mod logging;

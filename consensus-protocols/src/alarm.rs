/// Every alarm in every one of these protocols fires 20 ticks after it's
/// armed. A named constant instead of four copies of the literal.
pub const ALARM_DELAY_TICKS: u64 = 20;

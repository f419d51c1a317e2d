/// Distinguishes errors that will occur again no matter how often the same
/// request is repeated from ones that may go away on their own.
pub trait IsPermanent {
    fn is_permanent(&self) -> bool;
}

/// Logs `$err` at a level matching its permanence, which is what long-running
/// front ends want for per-request failures they cannot do anything about.
#[macro_export]
macro_rules! log_by_permanence {
    ($err: expr, $($arg:tt)+) => {
        if $crate::error::IsPermanent::is_permanent($err) {
            log::error!($($arg)+);
        } else {
            log::warn!($($arg)+);
        }
    }
}

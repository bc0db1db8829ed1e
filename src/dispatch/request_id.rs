use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Generates `cmd-<unix-nanos>` correlation ids.
///
/// Ids are strictly increasing within one generator even when the wall clock
/// stalls or steps backwards, so two dispatch attempts never share an id.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    last: AtomicI64,
}

impl RequestIdGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let next = |last: i64| now.max(last.saturating_add(1));
        // The closure always returns Some, so both arms carry the previous value.
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
        {
            Ok(previous) | Err(previous) => previous,
        };
        format!("cmd-{}", next(previous))
    }
}

use crate::models::job::{JobStatus, ResultTally};

/// Map a success count over `total` attempted cities to a terminal status.
///
/// `total` must be at least 1 and `success_count` at most `total`; a count
/// above `total` is clamped so the result is still one of the three
/// terminal states.
pub fn aggregate_status(success_count: u32, total: u32) -> JobStatus {
    debug_assert!(total >= 1, "aggregate_status called with no attempts");
    let success_count = success_count.min(total);

    if success_count == total {
        JobStatus::Success
    } else if success_count == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Partial
    }
}

/// Terminal status for everything recorded against a job so far.
pub fn status_for_tally(tally: ResultTally) -> JobStatus {
    if tally.attempted == 0 {
        return JobStatus::Failed;
    }
    aggregate_status(tally.succeeded, tally.attempted)
}

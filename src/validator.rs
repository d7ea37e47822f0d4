//! Output validation against should-have / should-lack / should-echo rules.
//!
//! Every check is an exact, case-sensitive substring containment test
//! against the full captured text. Checks are exhaustive: every entry in
//! every list is evaluated and logged regardless of earlier failures, so a
//! single run reports the complete set of unmet criteria.

use crate::runner::FailureCounter;
use crate::schema::Criteria;
use tracing::{error, info};

/// Error reported when the captured output did not satisfy the criteria.
#[derive(Debug, PartialEq, Eq)]
pub struct CriteriaNotMet {
    /// Echoed commands whose expected response never appeared.
    pub failed_echoes: u32,
    /// `should_have` entries missing from the output.
    pub missing_should_have: u32,
    /// `should_lack` entries that appeared in the output.
    pub found_should_lack: u32,
}

impl CriteriaNotMet {
    fn total(&self) -> u32 {
        self.failed_echoes + self.missing_should_have + self.found_should_lack
    }
}

impl std::fmt::Display for CriteriaNotMet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "criteria not met: {} echo response(s) missing, {} should-have missing, {} should-lack found",
            self.failed_echoes, self.missing_should_have, self.found_should_lack
        )
    }
}

impl std::error::Error for CriteriaNotMet {}

/// Check the captured output against every criteria entry.
///
/// Each unmet entry counts exactly once, no matter how often the substring
/// occurs; the combined total is added to `counter` in one batch.
pub fn validate_output(
    criteria: &Criteria,
    output: &str,
    counter: &FailureCounter,
) -> Result<(), CriteriaNotMet> {
    let mut unmet = CriteriaNotMet {
        failed_echoes: 0,
        missing_should_have: 0,
        found_should_lack: 0,
    };

    for echo in &criteria.should_echo {
        if output.contains(&echo.should_have) {
            info!(
                command = %echo.command,
                should_have = %echo.should_have,
                "echo response found"
            );
        } else {
            error!(
                command = %echo.command,
                should_have = %echo.should_have,
                "echo response not found"
            );
            unmet.failed_echoes += 1;
        }
    }

    for have in &criteria.should_have {
        if output.contains(have) {
            info!(should_have = %have, "should-have found");
        } else {
            error!(should_have = %have, "should-have not found");
            unmet.missing_should_have += 1;
        }
    }

    for lack in &criteria.should_lack {
        if output.contains(lack) {
            error!(should_lack = %lack, "should-lack found");
            unmet.found_should_lack += 1;
        } else {
            info!(should_lack = %lack, "should-lack not found");
        }
    }

    if unmet.total() > 0 {
        counter.add(unmet.total());
        return Err(unmet);
    }

    info!("all should-have and should-lack criteria met");
    Ok(())
}

/// Summary of a finished (or tick-budget-exhausted) run, returned by
/// [`crate::Kernel::run`]. Consumed by scenario tests (asserting exact
/// final statuses) and the CLI (printing a human summary).
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: u64,
    pub terminal: bool,
    pub final_statuses: Vec<String>,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub alarms_set: u64,
}

impl RunReport {
    pub fn status_counts(&self) -> std::collections::HashMap<&str, usize> {
        let mut counts = std::collections::HashMap::new();
        for status in &self.final_statuses {
            *counts.entry(status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "run finished after {} ticks (terminal={}), {} messages sent ({} dropped), {} alarms set",
            self.ticks, self.terminal, self.messages_sent, self.messages_dropped, self.alarms_set
        )?;
        for (slot, status) in self.final_statuses.iter().enumerate() {
            writeln!(f, "  node {slot}: {status}")?;
        }
        Ok(())
    }
}

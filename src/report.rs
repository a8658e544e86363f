use crate::block::NameCode;
use crate::clock::Tid;
use std::cmp::Ordering;
use std::fmt;

const RULE_HEAVY: &str =
    "===============================================================================";
const RULE_LIGHT: &str =
    "-------------------------------------------------------------------------------";

/// Aggregate history of one block on one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadProfile {
    pub tid: Tid,
    pub name: NameCode,
    pub total_ms: f64,
    pub calls: u64,
}

impl ThreadProfile {
    /// `None` when the block was started but never ended.
    pub fn average_ms(&self) -> Option<f64> {
        average(self.total_ms, self.calls)
    }
}

/// Aggregate history of one block summed across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub name: NameCode,
    pub total_ms: f64,
    pub calls: u64,
}

impl BlockSummary {
    pub fn average_ms(&self) -> Option<f64> {
        average(self.total_ms, self.calls)
    }
}

fn average(total_ms: f64, calls: u64) -> Option<f64> {
    if calls == 0 {
        None
    } else {
        Some(total_ms / calls as f64)
    }
}

/// Descending average; blocks without a completed call go last.
fn by_average_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    let a = a.unwrap_or(-1.0);
    let b = b.unwrap_or(-1.0);
    b.total_cmp(&a)
}

/// Snapshot of the aggregate store, ready to print.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    threads: Vec<ThreadProfile>,
    blocks: Vec<BlockSummary>,
}

impl AggregateReport {
    pub fn from_profiles(mut threads: Vec<ThreadProfile>) -> Self {
        threads.sort_by(|a, b| by_average_desc(a.average_ms(), b.average_ms()));

        let mut by_name: Vec<&ThreadProfile> = threads.iter().collect();
        by_name.sort_by_key(|p| p.name);

        let mut blocks: Vec<BlockSummary> = Vec::new();
        for profile in by_name {
            match blocks.last_mut() {
                Some(last) if last.name == profile.name => {
                    last.total_ms += profile.total_ms;
                    last.calls += profile.calls;
                }
                _ => blocks.push(BlockSummary {
                    name: profile.name,
                    total_ms: profile.total_ms,
                    calls: profile.calls,
                }),
            }
        }
        blocks.sort_by(|a, b| by_average_desc(a.average_ms(), b.average_ms()));

        Self { threads, blocks }
    }

    /// Per-thread rows, slowest average first.
    pub fn threads(&self) -> &[ThreadProfile] {
        &self.threads
    }

    /// Rows merged across threads, slowest average first.
    pub fn blocks(&self) -> &[BlockSummary] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&BlockSummary> {
        let code = NameCode::encode(name).ok()?;
        self.blocks.iter().find(|b| b.name == code)
    }

    pub fn thread(&self, tid: Tid, name: &str) -> Option<&ThreadProfile> {
        let code = NameCode::encode(name).ok()?;
        self.threads.iter().find(|p| p.tid == tid && p.name == code)
    }

    /// The two report tables, one line per entry.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.threads.len() + self.blocks.len() + 11);

        lines.push(RULE_HEAVY.to_string());
        lines.push("Thread-wise analysis results".to_string());
        lines.push(RULE_LIGHT.to_string());
        lines.push("Thread ID    Name    Average(ms)         Total(ms)           Calls".to_string());
        lines.push(RULE_LIGHT.to_string());
        for p in &self.threads {
            lines.push(match p.average_ms() {
                Some(avg) => format!(
                    "{:>9}    {:>4}    {:<16.2}    {:<16.2}    {:<10}",
                    p.tid, p.name, avg, p.total_ms, p.calls
                ),
                None => format!(
                    "{:>9}    {:>4}    {}",
                    p.tid,
                    p.name,
                    not_completed(p.name)
                ),
            });
        }

        lines.push(RULE_HEAVY.to_string());
        lines.push("Analysis results summed across threads".to_string());
        lines.push(RULE_LIGHT.to_string());
        lines.push("Name    Average(ms)         Total(ms)           Calls".to_string());
        lines.push(RULE_LIGHT.to_string());
        for b in &self.blocks {
            lines.push(match b.average_ms() {
                Some(avg) => format!(
                    "{:>4}    {:<16.2}    {:<16.2}    {:<10}",
                    b.name, avg, b.total_ms, b.calls
                ),
                None => format!("{:>4}    {}", b.name, not_completed(b.name)),
            });
        }
        lines.push(RULE_HEAVY.to_string());

        lines
    }
}

fn not_completed(name: NameCode) -> String {
    format!("end_offline(\"{}\") was not present or was not enabled", name)
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tid: Tid, name: &str, total_ms: f64, calls: u64) -> ThreadProfile {
        ThreadProfile {
            tid,
            name: NameCode::encode(name).unwrap(),
            total_ms,
            calls,
        }
    }

    #[test]
    fn test_thread_rows_sorted_by_average() {
        let report = AggregateReport::from_profiles(vec![
            profile(1, "FAST", 10.0, 10),
            profile(1, "SLOW", 90.0, 3),
            profile(2, "NONE", 0.0, 0),
            profile(2, "MID", 20.0, 4),
        ]);

        let names: Vec<String> = report.threads().iter().map(|p| p.name.decode()).collect();
        assert_eq!(names, vec!["SLOW", "MID", "FAST", "NONE"]);
        assert_eq!(report.threads()[0].average_ms(), Some(30.0));
        assert_eq!(report.threads()[3].average_ms(), None);
    }

    #[test]
    fn test_merges_across_threads() {
        let report = AggregateReport::from_profiles(vec![
            profile(1, "LP1", 30.0, 3),
            profile(2, "LP1", 10.0, 2),
            profile(3, "LP1", 0.0, 0),
            profile(1, "LP2", 100.0, 1),
        ]);

        assert_eq!(report.blocks().len(), 2);
        let lp1 = report.block("LP1").unwrap();
        assert_eq!(lp1.total_ms, 40.0);
        assert_eq!(lp1.calls, 5);
        assert_eq!(lp1.average_ms(), Some(8.0));
        assert_eq!(report.blocks()[0].name.decode(), "LP2");
    }

    #[test]
    fn test_merged_zero_calls_sorted_last() {
        let report = AggregateReport::from_profiles(vec![
            profile(1, "OPEN", 0.0, 0),
            profile(2, "OPEN", 0.0, 0),
            profile(1, "DONE", 1.0, 1),
        ]);
        assert_eq!(report.blocks()[1].name.decode(), "OPEN");
        assert_eq!(report.blocks()[1].average_ms(), None);
    }

    #[test]
    fn test_lines_format() {
        let report = AggregateReport::from_profiles(vec![
            profile(42, "AAAA", 60.0, 3),
            profile(42, "BB", 0.0, 0),
        ]);
        let lines = report.lines();

        assert!(lines.contains(
            &"Thread ID    Name    Average(ms)         Total(ms)           Calls".to_string()
        ));
        assert!(lines.contains(&format!(
            "{:>9}    AAAA    {:<16}    {:<16}    {:<10}",
            42, "20.00", "60.00", 3
        )));
        assert!(lines.contains(
            &"       42      BB    end_offline(\"BB\") was not present or was not enabled"
                .to_string()
        ));
        assert!(lines.contains(&format!(
            "AAAA    {:<16}    {:<16}    {:<10}",
            "20.00", "60.00", 3
        )));
        assert_eq!(report.to_string().lines().count(), lines.len());
    }
}

// Process listing parser: `pid ppid pcpu rss_kb` per line.

use crate::models::ProcessRecord;

/// Parses `ps -ax -o pid=,ppid=,pcpu=,rss=` output.
/// Lines without exactly four numeric fields are skipped.
pub fn parse_process_table(output: &str) -> Vec<ProcessRecord> {
    output.lines().filter_map(parse_process_line).collect()
}

fn parse_process_line(line: &str) -> Option<ProcessRecord> {
    let mut fields = line.split_whitespace();
    let pid = fields.next()?.parse::<u32>().ok()?;
    let parent_pid = fields.next()?.parse::<u32>().ok()?;
    let cpu_percent = fields.next()?.parse::<f64>().ok()?;
    let rss_kb = fields.next()?.parse::<u64>().ok()?;
    if fields.next().is_some() || !cpu_percent.is_finite() || cpu_percent < 0.0 {
        return None;
    }
    Some(ProcessRecord {
        pid,
        parent_pid,
        cpu_percent,
        resident_bytes: rss_kb.saturating_mul(1024),
    })
}

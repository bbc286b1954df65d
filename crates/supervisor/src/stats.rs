// SPDX-License-Identifier: MIT

//! CPU%/mem% sampling of the supervised child (spec.md §4.E, SPEC_FULL.md
//! §4.E): reads `/proc/<pid>/stat` and `/proc/<pid>/statm` on Linux,
//! skipping a tick silently on any read error rather than failing the
//! supervisor.

use std::time::Instant;

/// Ticks-per-second reported by the kernel; 100 on every Linux system this
/// targets (`sysconf(_SC_CLK_TCK)`, hardcoded the way minimal `/proc`
/// samplers commonly do rather than pulling in a libc binding just for
/// this one value).
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Tracks the previous sample so CPU% can be computed as a delta over wall
/// time, matching how `top`/`ps` derive instantaneous CPU usage from the
/// cumulative `utime`/`stime` counters.
pub struct StatsSampler {
    pid: u32,
    previous: Option<(u64, Instant)>,
}

impl StatsSampler {
    pub fn new(pid: u32) -> Self {
        Self { pid, previous: None }
    }

    /// Returns `(cpu_percent, mem_percent)`, or `None` for either value the
    /// current tick couldn't compute (first sample, or a read failure).
    pub fn sample(&mut self) -> (Option<f64>, Option<f64>) {
        let cpu = self.sample_cpu();
        let mem = self.sample_mem();
        (cpu, mem)
    }

    fn sample_cpu(&mut self) -> Option<f64> {
        let total_ticks = read_total_ticks(self.pid)?;
        let now = Instant::now();
        let cpu = match self.previous {
            Some((prev_ticks, prev_at)) => {
                let elapsed = now.duration_since(prev_at).as_secs_f64();
                if elapsed <= 0.0 || total_ticks < prev_ticks {
                    None
                } else {
                    let delta_secs = (total_ticks - prev_ticks) as f64 / CLOCK_TICKS_PER_SEC;
                    Some((delta_secs / elapsed) * 100.0)
                }
            }
            None => None,
        };
        self.previous = Some((total_ticks, now));
        cpu
    }

    fn sample_mem(&self) -> Option<f64> {
        let rss_pages = read_rss_pages(self.pid)?;
        let total_kb = read_mem_total_kb()?;
        let page_size_kb = 4.0; // standard 4 KiB pages on the platforms this targets
        let rss_kb = rss_pages as f64 * page_size_kb;
        if total_kb <= 0.0 {
            return None;
        }
        Some((rss_kb / total_kb) * 100.0)
    }
}

fn read_total_ticks(pid: u32) -> Option<u64> {
    let body = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Field 2 (`comm`) is parenthesized and may itself contain spaces, so
    // split on the *last* `)` before field-splitting the remainder.
    let after_comm = body.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // With `comm` and the leading `pid` removed, ps(1)'s field 14 (utime)
    // and 15 (stime) are now at indices 11 and 12.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

fn read_rss_pages(pid: u32) -> Option<u64> {
    let body = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let fields: Vec<&str> = body.split_whitespace().collect();
    fields.get(1)?.parse().ok()
}

fn read_mem_total_kb() -> Option<f64> {
    let body = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: f64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb);
        }
    }
    None
}

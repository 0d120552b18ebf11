//! Plain-text rendering of workspace snapshots.

use std::fmt::Write;

use super::{WorkspaceEntry, WorkspaceSnapshot};

const EMPTY: &str = "Workspace empty - no ignition yet.";

impl WorkspaceSnapshot {
    /// Render every retained cycle, oldest first.
    ///
    /// ```text
    /// [cycle 0] mat (priority 8/10, certainty 85%)
    ///     the cat sits on the mat
    ///     competitors: cat 3, *mat 8
    /// ```
    pub fn summary(&self) -> String {
        if self.history().is_empty() {
            return EMPTY.to_string();
        }
        let mut out = String::new();
        for entry in self.history() {
            render_entry(&mut out, entry);
        }
        out
    }
}

impl WorkspaceEntry {
    /// Single-cycle rendering, as used by [`WorkspaceSnapshot::summary`].
    pub fn summary(&self) -> String {
        let mut out = String::new();
        render_entry(&mut out, self);
        out
    }
}

fn render_entry(out: &mut String, entry: &WorkspaceEntry) {
    let _ = write!(
        out,
        "[cycle {}] {} (priority {}/10",
        entry.cycle,
        entry.winner.source(),
        entry.winner.priority()
    );
    if let Some(report) = &entry.monitor {
        let _ = write!(out, ", certainty {}%", report.certainty);
    }
    let _ = writeln!(out, ")");
    let _ = writeln!(out, "    {}", entry.winner.content());

    let competitors: Vec<String> = entry
        .competitors
        .iter()
        .map(|j| {
            let marker = if j.source() == entry.winner.source() { "*" } else { "" };
            format!("{}{} {}", marker, j.source(), j.priority())
        })
        .collect();
    let _ = writeln!(out, "    competitors: {}", competitors.join(", "));

    if !entry.dropouts.is_empty() {
        let dropped: Vec<String> = entry.dropouts.iter().map(|d| d.to_string()).collect();
        let _ = writeln!(out, "    dropped: {}", dropped.join("; "));
    }
    if let Some(report) = &entry.monitor {
        let _ = writeln!(out, "    monitor: {}", report.feedback);
    }
}

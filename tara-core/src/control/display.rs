// tara-core/src/control/display.rs
//
// In-place terminal table of the values sent each tick.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

pub fn render_table(values: &BTreeMap<String, f64>, loop_time: Duration) -> String {
    let width = values.keys().map(|k| k.len()).max().unwrap_or(4).max(4);
    let mut out = String::new();
    out.push_str(&"-".repeat(width + 10));
    out.push('\n');
    out.push_str(&format!("{:<width$} | {:>7}\n", "NAME", "NORM"));
    for (name, value) in values {
        out.push_str(&format!("{:<width$} | {:>7.2}\n", name, value));
    }
    let ms = loop_time.as_secs_f64() * 1e3;
    let hz = if ms > 0.0 { 1e3 / ms } else { 0.0 };
    out.push_str(&format!("\ntime: {ms:.2}ms ({hz:.0} Hz)\n"));
    out
}

/// Redraws the table over its previous frame.
#[derive(Default)]
pub struct LiveTable {
    lines: usize,
}

impl LiveTable {
    pub fn draw(&mut self, values: &BTreeMap<String, f64>, loop_time: Duration) {
        let table = render_table(values, loop_time);
        let mut stdout = std::io::stdout().lock();
        if self.lines > 0 {
            let _ = write!(stdout, "\x1b[{}A", self.lines);
        }
        let _ = write!(stdout, "{table}");
        let _ = stdout.flush();
        self.lines = table.lines().count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_value() {
        let mut values = BTreeMap::new();
        values.insert("left_wheel".to_string(), -0.5);
        values.insert("right_wheel".to_string(), 0.5);
        let table = render_table(&values, Duration::from_millis(20));

        assert!(table.contains("left_wheel  |   -0.50"));
        assert!(table.contains("right_wheel |    0.50"));
        assert!(table.contains("(50 Hz)"));
    }
}

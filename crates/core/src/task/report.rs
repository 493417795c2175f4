//! Report aggregation over task rows

use std::cmp::Ordering;
use std::collections::HashMap;

use super::model::{Report, Task};

/// Group tasks by name and sum their elapsed time.
///
/// Unstopped tasks contribute zero but still produce a row. Names with no
/// rows produce nothing.
pub fn aggregate<'a, I>(tasks: I) -> Vec<Report>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut totals: HashMap<&'a str, f64> = HashMap::new();
    for task in tasks {
        *totals.entry(task.name.as_str()).or_insert(0.0) += task.elapsed_time;
    }

    let mut reports: Vec<Report> = totals
        .into_iter()
        .map(|(name, total)| Report::new(name, total))
        .collect();
    rank(&mut reports);
    reports
}

/// Sort by total descending, then by name ascending.
pub fn rank(reports: &mut [Report]) {
    reports.sort_by(compare);
}

fn compare(a: &Report, b: &Report) -> Ordering {
    b.total_time
        .total_cmp(&a.total_time)
        .then_with(|| a.task.cmp(&b.task))
}

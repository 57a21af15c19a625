use log::{info, warn};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

/// Best-effort notification sink. Implementations swallow their own failures.
pub trait Notifier {
    fn notify(&self, title: &str, body: &str, urgency: Urgency);
}

/// Desktop notifications through `notify-send`.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str, urgency: Urgency) {
        let result = Command::new("notify-send")
            .arg(title)
            .arg(body)
            .arg("-u")
            .arg(urgency.as_str())
            .status();
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("notify-send exited with {}", status),
            Err(e) => warn!("Could not run notify-send: {}", e),
        }
    }
}

/// Writes the notification to the log instead.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, urgency: Urgency) {
        info!("[{}] {}: {}", urgency.as_str(), title, body.replace('\n', " "));
    }
}

/// Sends the end-of-sweep message for `accepted` new postings.
pub fn announce(notifier: &dyn Notifier, accepted: usize, high_value: usize) {
    let urgency = if high_value > 0 {
        Urgency::Critical
    } else {
        Urgency::Normal
    };
    let body = format!(
        "{} new postings found.\n{} are high-value.",
        accepted, high_value
    );
    notifier.notify("Job Tracker", &body, urgency);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<(String, Urgency)>>);

    impl Notifier for Recorder {
        fn notify(&self, _title: &str, body: &str, urgency: Urgency) {
            self.0.borrow_mut().push((body.to_string(), urgency));
        }
    }

    #[test]
    fn urgency_follows_high_value_count() {
        let rec = Recorder::default();
        announce(&rec, 3, 0);
        announce(&rec, 3, 1);
        let sent = rec.0.borrow();
        assert_eq!(sent[0].1, Urgency::Normal);
        assert_eq!(sent[1].1, Urgency::Critical);
        assert!(sent[1].0.starts_with("3 new postings found."));
    }

    #[test]
    fn body_reports_both_counts() {
        let rec = Recorder::default();
        announce(&rec, 4, 2);
        assert_eq!(rec.0.borrow()[0].0, "4 new postings found.\n2 are high-value.");
    }
}

//! Background process registry.
//!
//! Owns the `Child` handles of backgrounded pipelines. Reaping is
//! opportunistic: the driver sweeps the registry after every command line
//! with a non-blocking poll; exit statuses are discarded.

use std::process::Child;

use tracing::warn;

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Vec<Child>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a background pipeline's children.
    pub fn adopt(&mut self, children: Vec<Child>) {
        self.children.extend(children);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Non-blocking sweep: collect every child that has exited, keep the
    /// rest. The backing vector compacts once it is mostly empty.
    pub fn reap_finished(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(_status)) => false,
            Ok(None) => true,
            Err(err) => {
                warn!("cannot poll background child: {err}");
                true
            }
        });
        if self.children.capacity() > self.children.len() * 2 {
            self.children.shrink_to_fit();
        }
    }
}

// ===========================================================================
//  Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    fn spawn_true() -> Child {
        Command::new("true")
            .stdin(Stdio::null())
            .spawn()
            .expect("spawn true")
    }

    #[test]
    fn test_reap_collects_finished_children() {
        let mut registry = ProcessRegistry::new();
        registry.adopt(vec![spawn_true(), spawn_true()]);
        assert_eq!(registry.len(), 2);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !registry.is_empty() {
            assert!(Instant::now() < deadline, "children never reaped");
            registry.reap_finished();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_reap_keeps_running_children() {
        let mut registry = ProcessRegistry::new();
        let child = Command::new("sleep")
            .arg("5")
            .stdin(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        registry.adopt(vec![child]);

        registry.reap_finished();
        assert_eq!(registry.len(), 1);

        // Clean up without waiting out the sleep.
        let mut survivors = std::mem::take(&mut registry);
        for child in &mut survivors.children {
            child.kill().unwrap();
            child.wait().unwrap();
        }
    }
}

//! Named OS threads for long-running components.
//!
//! A component's thread body returns `anyhow::Result<()>`: an `Err` means
//! its startup failed (device not found, credentials missing, ...).  The
//! failure is logged when it happens and surfaced again to the supervisor
//! through [`ComponentThread::join`].

use std::thread::JoinHandle;

/// Handle to a running component thread.
pub struct ComponentThread {
    name: String,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl ComponentThread {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread and return the component's own result.  A panic
    /// that escaped the body is converted into an error.
    pub fn join(self) -> anyhow::Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("component '{}' panicked", self.name)),
        }
    }
}

/// Join and remove every thread in `threads` whose body already returned,
/// keeping the rest.  Returns each finished component's name and result.
pub fn reap_finished(threads: &mut Vec<ComponentThread>) -> Vec<(String, anyhow::Result<()>)> {
    let mut finished = Vec::new();
    let mut index = 0;
    while index < threads.len() {
        if threads[index].is_finished() {
            let thread = threads.swap_remove(index);
            let name = thread.name().to_string();
            finished.push((name, thread.join()));
        } else {
            index += 1;
        }
    }
    finished
}

/// Spawn `body` on a thread called `name`.
///
/// # Errors
///
/// Fails only when the OS refuses to create the thread.
pub fn spawn_component<F>(name: &str, body: F) -> std::io::Result<ComponentThread>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let thread_name = name.to_string();
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            log::info!("{thread_name}: started");
            let result = body();
            match &result {
                Ok(()) => log::info!("{thread_name}: stopped"),
                Err(e) => log::error!("{thread_name}: exited with error: {e:#}"),
            }
            result
        })?;

    Ok(ComponentThread {
        name: name.to_string(),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_returns_body_result() {
        let ok = spawn_component("ok-component", || Ok(())).unwrap();
        assert_eq!(ok.name(), "ok-component");
        assert!(ok.join().is_ok());

        let failed = spawn_component("failing-component", || anyhow::bail!("no device")).unwrap();
        let err = failed.join().unwrap_err();
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn join_converts_panics() {
        let thread = spawn_component("panicking-component", || panic!("boom")).unwrap();
        let err = thread.join().unwrap_err();
        assert!(err.to_string().contains("panicking-component"));
    }

    #[test]
    fn reap_finished_collects_failed_startup_only() {
        let (release, parked) = std::sync::mpsc::channel::<()>();
        let mut threads = vec![
            spawn_component("segmenter", || anyhow::bail!("no input device")).unwrap(),
            spawn_component("camera", move || {
                let _ = parked.recv();
                Ok(())
            })
            .unwrap(),
        ];
        while !threads[0].is_finished() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let finished = reap_finished(&mut threads);

        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0, "segmenter");
        let err = finished[0].1.as_ref().unwrap_err();
        assert!(err.to_string().contains("no input device"));
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].name(), "camera");

        drop(release);
        assert!(threads.pop().unwrap().join().is_ok());
    }

    #[test]
    fn thread_carries_component_name() {
        let thread = spawn_component("named-component", || {
            assert_eq!(std::thread::current().name(), Some("named-component"));
            Ok(())
        })
        .unwrap();
        assert!(thread.join().is_ok());
    }
}

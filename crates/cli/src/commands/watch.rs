//! `atolye watch`: follow a remote store and print the workshop summary.

use std::path::Path;
use std::process;
use std::sync::Arc;

use atolye_sync::SyncState;

use super::remote::connect;
use crate::render;
use crate::{report_error, OutputFormat};

fn print_state(state: &SyncState, output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            println!("── revision {} ──", state.revision);
            print!("{}", render::workshop_text(&state.summary));
            if !state.warnings.is_empty() {
                print!("{}", render::warnings_text(&state.warnings));
            }
        }
        // One compact document per line so the stream can be piped.
        OutputFormat::Json => {
            let json = serde_json::json!({
                "revision": state.revision,
                "summary": state.summary,
                "warnings": state.warnings,
            });
            println!("{}", json);
        }
    }
}

pub(crate) fn cmd_watch(config: Option<&Path>, once: bool, output: OutputFormat, quiet: bool) {
    let remote = connect(config, output, quiet);
    let coordinator = remote.coordinator.clone();

    if once {
        match remote.runtime.block_on(coordinator.refresh()) {
            Ok(()) => print_state(&coordinator.snapshot(), output),
            Err(e) => {
                report_error(&format!("error: {}", e), output, quiet);
                process::exit(1);
            }
        }
        return;
    }

    remote.runtime.block_on(async move {
        let mut rx = coordinator.subscribe();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await;
            })
        };

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut last: Option<Arc<SyncState>> = None;
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = rx.borrow_and_update().clone();
                    // Nothing to show until the first fetch lands, or mid-mutation.
                    if state.stale || state.phase.in_flight() {
                        continue;
                    }
                    if last.as_ref().is_some_and(|prev| prev.same_data(&state)) {
                        continue;
                    }
                    print_state(&state, output);
                    last = Some(state);
                }
            }
        }

        let _ = stop_tx.send(());
        if let Err(e) = runner.await {
            tracing::warn!("sync task ended abnormally: {}", e);
        }
    });
}

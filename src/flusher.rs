// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use crossbeam_channel::select;
use crossbeam_channel::tick;

use crate::context::Shared;

/// A thread that applies the time threshold while no writes arrive.
///
/// Writers only evaluate the sync policy after a write, so an idle context could hold unflushed
/// bytes forever. The flusher wakes every `interval` and runs the same evaluation under the
/// context lock.
#[derive(Debug)]
pub(crate) struct Flusher {
    handle: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl Flusher {
    pub(crate) fn spawn(thread_name: String, shared: Arc<Shared>, interval: Duration) -> Flusher {
        let (shutdown, shutdown_receiver) = bounded(1);
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || work(&shared, interval, shutdown_receiver))
            .expect("failed to spawn the background flusher thread");

        Flusher {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Stops and joins the thread. Calling this twice is a no-op.
    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let _ = self.shutdown.send(());
        if handle.join().is_err() {
            eprintln!("background flusher thread panicked");
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn work(shared: &Shared, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => shared.state().maybe_sync(),
        }
    }
}

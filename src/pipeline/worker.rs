//! Dedicated thread running one processing block over a frame channel

use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::block::ProcessingBlock;
use crate::frame::{FrameAllocator, FrameUnit};

/// Spawn `block` on its own thread. Units are processed strictly in arrival
/// order; the block is reset and handed back once `input` closes.
pub fn spawn_worker<B, A>(
    mut block: B,
    allocator: A,
    input: Receiver<FrameUnit>,
    output: Sender<FrameUnit>,
    pin_core: Option<usize>,
) -> std::io::Result<JoinHandle<B>>
where
    B: ProcessingBlock + 'static,
    A: FrameAllocator + Send + 'static,
{
    let name = block.name().to_owned();
    thread::Builder::new()
        .name(name.to_lowercase().replace(' ', "-"))
        .spawn(move || {
            if let Some(core) = pin_core {
                pin_to_core(core);
            }
            info!("{} worker started", name);

            let mut processed = 0u64;
            while let Ok(unit) = input.recv() {
                let out = block.invoke(&allocator, unit);
                processed += 1;
                if output.send(out).is_err() {
                    debug!("Output closed, stopping {} worker", name);
                    break;
                }
            }

            // Pipeline stopped: no half pair may survive into the next run
            block.reset();
            info!("{} worker stopped after {} units", name, processed);
            block
        })
}

fn pin_to_core(core: usize) {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!("Unable to query CPU cores, not pinning");
        return;
    };
    match ids.into_iter().find(|id| id.id == core) {
        Some(id) if core_affinity::set_for_current(id) => debug!("Pinned to core {}", core),
        _ => warn!("Failed to pin worker to core {}", core),
    }
}

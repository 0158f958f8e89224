//! Discord backend: serenity for the gateway, songbird for voice.
//!
//! Both halves share one [`Songbird`] manager, which the gateway registers
//! with the serenity client so voice state updates reach it.

mod gateway;
mod source;
mod voice;

pub use gateway::DiscordGateway;
pub use source::opus_input;
pub use voice::{SongbirdDriver, SongbirdTransport};

use songbird::Songbird;
use std::sync::Arc;
use std::time::Duration;

/// Build a gateway and a voice driver sharing one songbird manager.
///
/// `rejoin_timeout` bounds each transport-level rejoin after a runtime
/// disconnect.
pub fn backend(rejoin_timeout: Duration) -> (Arc<DiscordGateway>, Arc<SongbirdDriver>) {
    let songbird = Songbird::serenity();
    (
        Arc::new(DiscordGateway::new(Arc::clone(&songbird))),
        Arc::new(SongbirdDriver::new(songbird).with_rejoin_timeout(rejoin_timeout)),
    )
}

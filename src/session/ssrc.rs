//! SSRC collision and loop classification (RFC 3550 Section 8.2).

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::RtpSsrc;

/// Outcome of checking an inbound data packet's SSRC against the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrcVerdict {
    /// The packet belongs to a remote source
    Normal,

    /// The session is receiving its own packets directly (fatal)
    SelfLoop,

    /// Too many collisions in a row, assume a loop (fatal)
    LoopByCollisions,

    /// A third party collided with the local SSRC; rotate to `new_ssrc`
    Collision {
        /// Replacement local SSRC, free in the session
        new_ssrc: RtpSsrc,
    },
}

/// Classify an inbound data packet whose SSRC may clash with the local one.
///
/// `collision_count` is the number of collisions resolved so far; `in_use`
/// holds every SSRC currently known to the participant database.
pub fn classify(
    packet_ssrc: RtpSsrc,
    local_ssrc: RtpSsrc,
    local_data_address: Option<SocketAddr>,
    origin: SocketAddr,
    collision_count: u32,
    max_collisions: u32,
    in_use: &HashSet<RtpSsrc>,
) -> SsrcVerdict {
    if packet_ssrc != local_ssrc {
        return SsrcVerdict::Normal;
    }

    if local_data_address == Some(origin) {
        return SsrcVerdict::SelfLoop;
    }

    if collision_count + 1 > max_collisions {
        return SsrcVerdict::LoopByCollisions;
    }

    SsrcVerdict::Collision {
        new_ssrc: generate_ssrc(local_ssrc, in_use),
    }
}

/// Draw a fresh SSRC from `[1, 2^32)`, avoiding `exclude` and every entry of
/// `in_use`
pub fn generate_ssrc(exclude: RtpSsrc, in_use: &HashSet<RtpSsrc>) -> RtpSsrc {
    loop {
        let candidate = rand::random::<RtpSsrc>();
        if candidate != 0 && candidate != exclude && !in_use.contains(&candidate) {
            return candidate;
        }
    }
}

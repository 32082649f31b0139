//! Load management — admission thresholds for connections/channels and
//! a backpressure advisory derived from each connection's outbox depth.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::LoadManagementConfig;

/// Tracks global connection/channel counters against configured ceilings and
/// decides whether new admissions should be shed.
pub struct LoadManager {
    config: LoadManagementConfig,
    connections: AtomicUsize,
    channels: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    ShedConnection,
    ShedChannel,
}

impl LoadManager {
    pub fn new(config: LoadManagementConfig) -> Self {
        LoadManager {
            config,
            connections: AtomicUsize::new(0),
            channels: AtomicUsize::new(0),
        }
    }

    /// Call when a connection is admitted.
    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn channel_created(&self) {
        self.channels.fetch_add(1, Ordering::SeqCst);
    }

    pub fn channel_destroyed(&self) {
        self.channels.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.load(Ordering::SeqCst)
    }

    /// Whether a new connection should be admitted, accounting for the
    /// shed-load ratio (admit up to `shed_load_at * max_connections`, then
    /// start rejecting before hitting the hard ceiling) and the same ratio
    /// applied to the global channel ceiling, since a fleet already near its
    /// channel limit has no room left to let a new connection subscribe.
    pub fn admit_connection(&self) -> Admission {
        let connection_shed_at = (self.config.max_connections as f64 * self.config.shed_load_at) as usize;
        if self.connection_count() >= connection_shed_at {
            return Admission::ShedConnection;
        }
        let channel_shed_at = (self.config.max_global_channels as f64 * self.config.shed_load_at) as usize;
        if self.channel_count() >= channel_shed_at {
            return Admission::ShedChannel;
        }
        Admission::Accept
    }

    pub fn admit_global_channel(&self) -> Admission {
        if self.channel_count() >= self.config.max_global_channels {
            Admission::ShedChannel
        } else {
            Admission::Accept
        }
    }

    pub fn admit_connection_channel(&self, connection_channel_count: usize) -> Admission {
        if connection_channel_count >= self.config.max_channels_per_connection {
            Admission::ShedChannel
        } else {
            Admission::Accept
        }
    }

    /// Whether a connection's queued-but-unsent byte count has crossed the
    /// backpressure threshold.
    pub fn is_backpressured(&self, outbox_bytes: usize) -> bool {
        outbox_bytes >= self.config.backpressure_threshold
    }
}

//! Hub configuration

use std::time::Duration;

/// Stream multiplexer configuration options
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Initial upstream URL (can also be set later through the hub)
    pub source_url: Option<String>,

    /// Bound on how long an upstream connect attempt may take
    pub connect_timeout: Duration,

    /// How long the upstream session survives with zero subscribers before
    /// being torn down
    pub idle_grace: Duration,

    /// Frame broadcast channel depth (lagging frame subscribers skip frames)
    pub broadcast_capacity: usize,

    /// Per-raw-subscriber sink depth (a full sink drops the subscriber)
    pub raw_queue_capacity: usize,

    /// Actor mailbox depth
    pub command_queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            connect_timeout: Duration::from_secs(10),
            idle_grace: Duration::from_secs(3),
            broadcast_capacity: 64,
            raw_queue_capacity: 64,
            command_queue_depth: 256,
        }
    }
}

impl StreamConfig {
    /// Create a config with an upstream URL already set
    pub fn with_source(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the upstream URL
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle grace period
    pub fn idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace = grace;
        self
    }

    /// Set the frame broadcast channel depth
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the per-raw-subscriber sink depth
    pub fn raw_queue_capacity(mut self, capacity: usize) -> Self {
        self.raw_queue_capacity = capacity.max(1);
        self
    }
}

/// Upload reassembly configuration options
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum age of an incomplete upload before it is garbage collected
    pub chunk_expiry: Duration,

    /// Background expiry sweep interval
    pub sweep_interval: Duration,

    /// Upper bound on the declared chunk count of a single upload
    pub max_chunks: u32,

    /// Owner id used when the pipeline cannot resolve an owner token
    pub fallback_owner: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_expiry: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            max_chunks: 512,
            fallback_owner: None,
        }
    }
}

impl UploadConfig {
    /// Set the incomplete-upload expiry window
    pub fn chunk_expiry(mut self, expiry: Duration) -> Self {
        self.chunk_expiry = expiry;
        self
    }

    /// Set the background sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the declared-chunk-count limit
    pub fn max_chunks(mut self, max: u32) -> Self {
        self.max_chunks = max.max(1);
        self
    }

    /// Set the fallback owner id
    pub fn fallback_owner(mut self, owner: impl Into<String>) -> Self {
        self.fallback_owner = Some(owner.into());
        self
    }
}

/// Combined hub configuration
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Stream multiplexer options
    pub stream: StreamConfig,

    /// Upload reassembly options
    pub upload: UploadConfig,
}

impl HubConfig {
    /// Create a config with an upstream URL already set
    pub fn with_source(url: impl Into<String>) -> Self {
        Self {
            stream: StreamConfig::with_source(url),
            upload: UploadConfig::default(),
        }
    }

    /// Replace the stream section
    pub fn stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Replace the upload section
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }
}

/// Name of the server, sent in the `Server` response header.
pub const SERVER: &str = concat!("tsgw/", env!("CARGO_PKG_VERSION"));

/// Component reported on request spans.
pub const COMPONENT: &str = "tsgw/api";

/// Content type of uncompressed binary metric messages.
pub const CONTENT_TYPE_BINARY: &str = "rt-metric-binary";

/// Content type of snappy-framed binary metric messages.
pub const CONTENT_TYPE_BINARY_SNAPPY: &str = "rt-metric-binary-snappy";

/// Header through which admins act on behalf of another organization.
pub const ORG_OVERRIDE_HEADER: &str = "x-tsdb-org";

/// Maximum number of bytes of an error response kept for the request span.
pub const MAX_ERROR_BODY_CAPTURE: usize = 4096;

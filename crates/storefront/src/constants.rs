/// Prefix shared by every signed gateway parameter.
pub const CHECKOUT_PREFIX: &str = "checkout-";

/// Header / query parameter carrying the hex HMAC over the canonical message.
pub const SIGNATURE_HEADER: &str = "signature";

/// The only MAC algorithm this client signs with or accepts.
pub const SIGNATURE_ALGORITHM: &str = "sha256";

/// Default Paytrail-compatible API base URL.
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://services.paytrail.com";

/// Default bound on a single outbound gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// How long an ACTIVE payment attempt may wait for a callback before it expires.
pub const DEFAULT_PAYMENT_EXPIRY_SECS: u64 = 30 * 60;

/// Period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on the quantity of a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// Upper bound on the length of a product id.
pub const MAX_PRODUCT_ID_LEN: usize = 128;

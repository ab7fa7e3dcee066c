/// Storefront display name used in outbound messages.
pub const STORE_NAME: &str = "SFAXIEN SCRIPTS";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Validity window of a signed download link, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 5 * 60;

/// Extension appended to an item name to build the suggested download filename.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Settlement currency of the manual crypto checkout.
pub const DEFAULT_PAYMENT_CURRENCY: &str = "BNB";

/// Static deposit wallet shown in payment instructions.
pub const DEFAULT_DEPOSIT_ADDRESS: &str = "0xebb11a6839fb387a3dae9cadf463571901da0744";

/// Merchant label sent along with the checkout instruction.
pub const SUB_MERCHANT: &str = "SFAXIEN_SCRIPTS";

/// Public bucket holding preview images.
pub const PREVIEW_BUCKET: &str = "item-previews";

/// Private bucket holding downloadable archives.
pub const FILE_BUCKET: &str = "item-files";

/// Path segment that prefixes every stored-object reference.
pub const PUBLIC_OBJECT_PREFIX: &str = "/storage/v1/object/public/";

/// Path segment that prefixes every signed retrieval link.
pub const SIGNED_OBJECT_PREFIX: &str = "/storage/v1/object/sign/";

/// Number of items returned by the featured listing.
pub const FEATURED_ITEM_COUNT: u32 = 3;

/// Number of entries shown in a profile's recent-downloads list.
pub const RECENT_DOWNLOADS_LIMIT: u32 = 10;

/// Inclusive bounds of a rating score.
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Maximum upload size in bytes (100 MiB)
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

//! Pure normalizers applied to provider records before they reach the store.
//!
//! Every function here is total: malformed input falls back to a safe value
//! instead of failing.

pub mod company_name;
pub mod currency;
pub mod region;
pub mod units;

pub use company_name::canonical_company_name;
pub use currency::{normalize_currency, DEFAULT_CURRENCY};
pub use region::{normalize_region, RegionCodeMap, ResolvedRegion, UNKNOWN_REGION};
pub use units::normalize_weight;

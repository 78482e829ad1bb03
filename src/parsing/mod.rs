pub mod product_name;

pub use product_name::{parse_product_name, ParsedName};

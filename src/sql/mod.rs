pub mod builder;
pub mod params;

pub use builder::{
    count, delete, insert, select_by_id, select_list, select_names_by_ids, select_references,
    update, Comparator, QueryBuf,
};
pub use params::PgBindValue;

// Entity Models
// Both sides of the substance join:
// - substance: the reference catalog mentions resolve against
// - product: the parent items whose composition strings hold the mentions

pub mod product;
pub mod substance;

pub use product::{
    find_column, product_catalog, ColumnLayout, ColumnPatterns, ParentItem, ProductCatalogRow,
    ProductRow, ProductTable,
};
pub use substance::{compare_reference_ids, CompositionRow, ReferenceEntry, SubstanceCatalog};

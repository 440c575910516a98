//! Schema introspection surfaces and the selection model shared by the
//! delegation engine.

mod field_type;
mod schema;
mod selection;

pub use field_type::FieldType;
pub use field_type::InvalidValue;
pub use schema::LeafParser;
pub use schema::Schema;
pub use schema::TypeDef;
pub use schema::TypeKind;
pub use selection::collect_fields;
pub use selection::execute_selection_set;
pub use selection::write_selection_set;
pub use selection::Field;
pub use selection::InlineFragment;
pub use selection::Selection;
pub use selection::TYPENAME_FIELD;

//! Entity metadata: declarative markers, resolution and mapping.

pub mod descriptor;
pub mod mapper;
pub mod resolver;

pub use descriptor::{Entity, EntityDescriptor, Property};
pub use mapper::{entity_buffer, map_row, to_parameter_map, ColumnBinder, MappedRow};
pub use resolver::{
    column_info, entity_details, table_name, EntityDetails, EntityMetadata, MappedProperty,
    MetadataRegistry, TableColumnInfo,
};

//! Geometry data
//!
//! The GPU buffers themselves belong to the backend. A geometry exposes them
//! to passes as properties of its provider: one `Resource` per vertex
//! attribute plus the vertex and index counts.

use void_data::{PropertyStore, ProviderHandle, Value};

/// Vertex data of a surface, published through a property provider
#[derive(Debug, Clone)]
pub struct Geometry {
    name: String,
    data: ProviderHandle,
}

impl Geometry {
    /// Create a geometry with an empty provider
    pub fn new(store: &mut PropertyStore, name: impl Into<String>) -> Self {
        let name = name.into();
        let data = store.create_provider(format!("geometry:{}", name));
        Self { name, data }
    }

    /// Geometry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider holding the geometry properties
    pub fn data(&self) -> ProviderHandle {
        self.data
    }

    /// Publish a vertex buffer as `geometry[<attribute>]`
    pub fn set_vertex_buffer(
        &self,
        store: &mut PropertyStore,
        attribute: &str,
        buffer: u64,
    ) -> void_data::Result<()> {
        store.set(self.data, &Self::attribute_property(attribute), Value::Resource(buffer))
    }

    /// Withdraw a vertex buffer
    pub fn remove_vertex_buffer(&self, store: &mut PropertyStore, attribute: &str) -> void_data::Result<()> {
        store.unset(self.data, &Self::attribute_property(attribute))?;
        Ok(())
    }

    /// Publish the vertex count
    pub fn set_vertex_count(&self, store: &mut PropertyStore, count: usize) -> void_data::Result<()> {
        store.set(self.data, "geometry.vertexCount", count)
    }

    /// Publish the index buffer and its length
    pub fn set_indices(&self, store: &mut PropertyStore, buffer: u64, count: usize) -> void_data::Result<()> {
        store.set(self.data, "geometry.indices", Value::Resource(buffer))?;
        store.set(self.data, "geometry.indexCount", count)
    }

    /// Property name an attribute's vertex buffer is published under
    pub fn attribute_property(attribute: &str) -> String {
        format!("geometry[{}]", attribute)
    }
}

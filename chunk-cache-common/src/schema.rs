// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Identifier of an attribute within its array.
pub type AttributeId = u32;

/// One coordinate along one dimension.
pub type Coordinate = i64;

/// A position in an n-dimensional array.
pub type Coordinates = Vec<Coordinate>;

/// Compression method recorded on a chunk.
///
/// The cache never compresses anything itself; the method is carried for the readers of the chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// Stored as is.
    #[default]
    None,
    /// zlib.
    Zlib,
    /// bzip2.
    Bzlib,
    /// Run length encoding.
    RunLength,
}

/// The logical position of a chunk within one array.
///
/// Addresses are ordered by coordinates first and attribute second, so iterating an ordered map of addresses visits
/// all attributes of one chunk position before moving on to the next position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Coordinates of the chunk origin.
    pub coords: Coordinates,
    /// Attribute of the chunk.
    pub attribute: AttributeId,
}

impl Address {
    /// Create a new chunk address.
    pub fn new(attribute: AttributeId, coords: impl Into<Coordinates>) -> Self {
        Self {
            coords: coords.into(),
            attribute,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:?}", self.attribute, self.coords)
    }
}

/// Attribute descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDesc {
    /// Attribute id, equals to its index in the array descriptor.
    pub id: AttributeId,
    /// Attribute name.
    pub name: String,
    /// Compression method for new chunks of this attribute.
    pub default_compression: CompressionMethod,
    /// Whether this is the empty bitmap (validity) attribute of the array.
    pub empty_bitmap: bool,
}

impl AttributeDesc {
    /// Create a regular attribute descriptor.
    pub fn new(id: AttributeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            default_compression: CompressionMethod::None,
            empty_bitmap: false,
        }
    }

    /// Set the default compression method.
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.default_compression = method;
        self
    }
}

/// Dimension descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDesc {
    /// Dimension name.
    pub name: String,
    /// First coordinate (inclusive).
    pub start: Coordinate,
    /// Last coordinate (inclusive).
    pub end: Coordinate,
    /// Length of a chunk along this dimension.
    pub chunk_interval: u64,
}

impl DimensionDesc {
    /// Create a dimension descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_interval` is zero or `end < start`.
    pub fn new(name: impl Into<String>, start: Coordinate, end: Coordinate, chunk_interval: u64) -> Self {
        assert!(chunk_interval > 0, "chunk interval must be positive");
        assert!(end >= start, "dimension end ({end}) must not be less than start ({start})");
        Self {
            name: name.into(),
            start,
            end,
            chunk_interval,
        }
    }
}

/// Array descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDesc {
    name: String,
    attributes: Vec<AttributeDesc>,
    dimensions: Vec<DimensionDesc>,
}

impl ArrayDesc {
    /// Create an array descriptor.
    ///
    /// # Panics
    ///
    /// Panics if an attribute id does not match its index.
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeDesc>, dimensions: Vec<DimensionDesc>) -> Self {
        for (i, attr) in attributes.iter().enumerate() {
            assert_eq!(attr.id as usize, i, "attribute ids must be dense and ordered");
        }
        Self {
            name: name.into(),
            attributes,
            dimensions,
        }
    }

    /// Append the empty bitmap attribute as the last attribute.
    pub fn with_empty_bitmap(mut self) -> Self {
        let id = self.attributes.len() as AttributeId;
        self.attributes.push(AttributeDesc {
            id,
            name: "empty_indicator".to_string(),
            default_compression: CompressionMethod::RunLength,
            empty_bitmap: true,
        });
        self
    }

    /// Array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All attributes, including the empty bitmap attribute if any.
    pub fn attributes(&self) -> &[AttributeDesc] {
        &self.attributes
    }

    /// All dimensions.
    pub fn dimensions(&self) -> &[DimensionDesc] {
        &self.dimensions
    }

    /// Look up an attribute by id.
    pub fn attribute(&self, id: AttributeId) -> Option<&AttributeDesc> {
        self.attributes.get(id as usize)
    }

    /// The empty bitmap attribute, if the array has one.
    pub fn empty_bitmap_attribute(&self) -> Option<&AttributeDesc> {
        self.attributes.iter().find(|attr| attr.empty_bitmap)
    }

    /// Check whether the coordinates are within the array bounds.
    pub fn contains(&self, coords: &[Coordinate]) -> bool {
        coords.len() == self.dimensions.len()
            && self
                .dimensions
                .iter()
                .zip(coords)
                .all(|(dim, &c)| c >= dim.start && c <= dim.end)
    }

    /// Snap the coordinates to the origin of the chunk that contains them.
    ///
    /// Coordinates must be within the array bounds, see [`ArrayDesc::contains`].
    pub fn chunk_position_for(&self, coords: &mut [Coordinate]) {
        for (dim, c) in self.dimensions.iter().zip(coords.iter_mut()) {
            debug_assert!(*c >= dim.start && *c <= dim.end, "coordinate {c} out of dimension {}", dim.name);
            // Dimensions may span more than `i64::MAX`.
            let offset = (*c as i128 - dim.start as i128).rem_euclid(dim.chunk_interval as i128);
            *c = (*c as i128 - offset) as Coordinate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> ArrayDesc {
        ArrayDesc::new(
            "a",
            vec![AttributeDesc::new(0, "x"), AttributeDesc::new(1, "y")],
            vec![DimensionDesc::new("i", 0, 99, 10), DimensionDesc::new("j", -5, 14, 5)],
        )
        .with_empty_bitmap()
    }

    #[test]
    fn test_empty_bitmap() {
        let desc = desc();
        assert_eq!(desc.attributes().len(), 3);
        let bitmap = desc.empty_bitmap_attribute().unwrap();
        assert_eq!(bitmap.id, 2);
        assert!(bitmap.empty_bitmap);
    }

    #[test]
    fn test_contains() {
        let desc = desc();
        assert!(desc.contains(&[0, -5]));
        assert!(desc.contains(&[99, 14]));
        assert!(!desc.contains(&[100, 0]));
        assert!(!desc.contains(&[0, -6]));
        assert!(!desc.contains(&[0]));
    }

    #[test]
    fn test_chunk_position_for() {
        let desc = desc();
        let mut coords = vec![37, 3];
        desc.chunk_position_for(&mut coords);
        assert_eq!(coords, vec![30, 0]);

        let mut coords = vec![9, -1];
        desc.chunk_position_for(&mut coords);
        assert_eq!(coords, vec![0, -5]);
    }

    #[test]
    fn test_chunk_position_for_wide_dimension() {
        let desc = ArrayDesc::new(
            "wide",
            vec![AttributeDesc::new(0, "x")],
            vec![
                DimensionDesc::new("i", i64::MIN, i64::MAX, 1 << 62),
                DimensionDesc::new("j", i64::MIN, i64::MAX, u64::MAX),
            ],
        );

        let mut coords = vec![i64::MAX, i64::MAX];
        desc.chunk_position_for(&mut coords);
        assert_eq!(coords, vec![1 << 62, i64::MAX]);

        let mut coords = vec![i64::MIN, 0];
        desc.chunk_position_for(&mut coords);
        assert_eq!(coords, vec![i64::MIN, i64::MIN]);
    }

    #[test]
    fn test_address_order() {
        let a = Address::new(1, vec![0, 0]);
        let b = Address::new(0, vec![0, 5]);
        let c = Address::new(0, vec![0, 0]);
        let mut addrs = vec![a.clone(), b.clone(), c.clone()];
        addrs.sort();
        assert_eq!(addrs, vec![c, a, b]);
    }
}

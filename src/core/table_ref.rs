use std::fmt;
use std::sync::Arc;

/// One step below a structural position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableRefSegment {
    /// Object key holding a subdocument or an array.
    Name(String),
    /// Anonymous nesting level of an array held directly by another array.
    /// A named array is dimension 1, so the first nested level is 2.
    ArrayDimension(u32),
}

/// Immutable path from the document root to a structural position.
///
/// Identity is the full path. The path is shared behind an `Arc`, so cloning
/// is cheap and a `TableRef` can be handed across translation units freely;
/// the parent is derived from the path instead of being linked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    path: Arc<[TableRefSegment]>,
}

impl TableRef {
    pub fn root() -> Self {
        TableRef { path: Arc::from(Vec::new()) }
    }

    pub fn child(&self, name: &str) -> Self {
        self.extend(TableRefSegment::Name(name.to_string()))
    }

    /// Position of arrays nested directly inside the array stored here.
    pub fn array_child(&self) -> Self {
        let dimension = match self.path.last() {
            Some(TableRefSegment::ArrayDimension(dimension)) => dimension + 1,
            _ => 2,
        };
        self.extend(TableRefSegment::ArrayDimension(dimension))
    }

    fn extend(&self, segment: TableRefSegment) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend(self.path.iter().cloned());
        path.push(segment);
        TableRef { path: Arc::from(path) }
    }

    pub fn parent(&self) -> Option<TableRef> {
        if self.is_root() {
            return None;
        }
        Some(TableRef { path: Arc::from(&self.path[..self.path.len() - 1]) })
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn segments(&self) -> &[TableRefSegment] {
        &self.path
    }

    pub fn last_segment(&self) -> Option<&TableRefSegment> {
        self.path.last()
    }

    pub fn is_in_array(&self) -> bool {
        matches!(self.path.last(), Some(TableRefSegment::ArrayDimension(_)))
    }

    /// Name of the nearest named position, skipping anonymous array levels.
    pub fn name(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|segment| match segment {
            TableRefSegment::Name(name) => Some(name.as_str()),
            TableRefSegment::ArrayDimension(_) => None,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return write!(f, "<root>");
        }
        for (index, segment) in self.path.iter().enumerate() {
            match segment {
                TableRefSegment::Name(name) if index == 0 => write!(f, "{}", name)?,
                TableRefSegment::Name(name) => write!(f, ".{}", name)?,
                TableRefSegment::ArrayDimension(dimension) => write!(f, "${}", dimension)?,
            }
        }
        Ok(())
    }
}

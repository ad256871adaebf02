//! Declarative record layouts

/// Unit of a date/time counter relative to a format epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Days,
    Minutes,
    Seconds,
}

/// One node of a record layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Big-endian integer of `width` bits, two's complement when `signed`
    FixedInteger {
        name: &'static str,
        width: usize,
        signed: bool,
    },
    /// Opaque blob of `width` bits
    FixedHex { name: &'static str, width: usize },
    /// Raw counter of `unit`s since a format-specific epoch
    Date {
        name: &'static str,
        width: usize,
        unit: TimeUnit,
    },
    /// Children always present, back-to-back
    Container(Vec<Field>),
    /// One presence bit per child, followed by the present children.
    ///
    /// The presence bits are read as one integer; its least significant bit
    /// gates the first child.
    Bitmap(Vec<Field>),
}

impl Field {
    /// Unsigned integer field
    pub fn int(name: &'static str, width: usize) -> Self {
        Self::FixedInteger {
            name,
            width,
            signed: false,
        }
    }

    /// Signed integer field
    pub fn signed(name: &'static str, width: usize) -> Self {
        Self::FixedInteger {
            name,
            width,
            signed: true,
        }
    }

    /// Hex blob field
    pub fn hex(name: &'static str, width: usize) -> Self {
        Self::FixedHex { name, width }
    }

    /// Day counter
    pub fn days(name: &'static str, width: usize) -> Self {
        Self::Date {
            name,
            width,
            unit: TimeUnit::Days,
        }
    }

    /// Minute counter
    pub fn minutes(name: &'static str, width: usize) -> Self {
        Self::Date {
            name,
            width,
            unit: TimeUnit::Minutes,
        }
    }

    /// Second counter
    pub fn seconds(name: &'static str, width: usize) -> Self {
        Self::Date {
            name,
            width,
            unit: TimeUnit::Seconds,
        }
    }

    pub fn container(children: Vec<Field>) -> Self {
        Self::Container(children)
    }

    pub fn bitmap(children: Vec<Field>) -> Self {
        Self::Bitmap(children)
    }

    /// Name of a leaf field, `None` for composites
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::FixedInteger { name, .. } | Self::FixedHex { name, .. } | Self::Date { name, .. } => {
                Some(name)
            }
            Self::Container(_) | Self::Bitmap(_) => None,
        }
    }

    /// Width in bits when it does not depend on the data
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::FixedInteger { width, .. } | Self::FixedHex { width, .. } | Self::Date { width, .. } => {
                Some(*width)
            }
            Self::Container(children) => children.iter().map(Field::fixed_width).sum(),
            Self::Bitmap(_) => None,
        }
    }

    /// Smallest number of bits any encoding of this field occupies
    pub fn min_width(&self) -> usize {
        match self {
            Self::Container(children) => children.iter().map(Field::min_width).sum(),
            Self::Bitmap(children) => children.len(),
            leaf => leaf.fixed_width().unwrap_or(0),
        }
    }

    /// Whether a leaf with this name appears anywhere under this node
    pub fn declares(&self, wanted: &str) -> bool {
        match self {
            Self::Container(children) | Self::Bitmap(children) => {
                children.iter().any(|c| c.declares(wanted))
            }
            leaf => leaf.name() == Some(wanted),
        }
    }
}

/// A complete record layout: an implicit container at the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    root: Field,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            root: Field::Container(fields),
        }
    }

    pub fn root(&self) -> &Field {
        &self.root
    }

    /// Total width in bits for layouts without bitmaps
    pub fn fixed_width(&self) -> Option<usize> {
        self.root.fixed_width()
    }

    pub fn min_width(&self) -> usize {
        self.root.min_width()
    }
}

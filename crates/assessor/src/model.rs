use serde_json::Value;

use bullseye_gradebook::Strictness;

/// Scalar sources the `get` collector can fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueSource {
    /// Number of children at the bottom level of the bullseye. Counting
    /// looks one level up from the leaves to see sibling counts.
    Count,
    /// A child element's index among its immediate siblings.
    ChildPosition,
    InnerHtml,
    UserAgent,
    DevicePixelRatio,
}

impl ValueSource {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(Self::Count),
            "childPosition" => Some(Self::ChildPosition),
            "innerHTML" => Some(Self::InnerHtml),
            "UAString" => Some(Self::UserAgent),
            "DPR" => Some(Self::DevicePixelRatio),
            _ => None,
        }
    }

    /// Operation name registered with the GradeBook.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::ChildPosition => "childPosition",
            Self::InnerHtml => "innerHTML",
            Self::UserAgent => "UAString",
            Self::DevicePixelRatio => "DPR",
        }
    }
}

/// Which side of an element an absolute-position check reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edge {
    Top,
    Left,
    Bottom,
    Right,
}

impl Edge {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "top" => Some(Self::Top),
            "left" => Some(Self::Left),
            "bottom" => Some(Self::Bottom),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// How many of the expected substring patterns must hit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HitPolicy {
    /// Exactly this many hits, overriding min/max.
    pub exact: Option<u32>,
    /// Defaults to 1.
    pub min: Option<u32>,
    /// Defaults to the number of expected patterns.
    pub max: Option<u32>,
}

/// The closed set of pipeline operations. Collectors build or extend the
/// Target tree; graders evaluate collected values and produce a report.
#[derive(Clone, Debug, PartialEq)]
pub enum OpSpec {
    // -- collectors --
    SelectElements {
        selector: String,
    },
    SelectDeepChildren {
        selector: String,
    },
    WaitForEvent {
        name: String,
    },
    Get(ValueSource),
    CssProperty {
        property: String,
    },
    Attribute {
        name: String,
    },
    Property {
        key: String,
    },
    AbsolutePosition {
        edge: Edge,
    },
    // -- modifiers --
    Limit(Strictness),
    Not,
    // -- graders --
    Exists,
    Equals {
        expected: Vec<Value>,
    },
    IsGreaterThan {
        expected: f64,
        or_equal: bool,
    },
    IsLessThan {
        expected: f64,
        or_equal: bool,
    },
    IsInRange {
        lower: f64,
        upper: f64,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
    HasSubstring {
        patterns: Vec<String>,
        policy: HitPolicy,
    },
}

impl OpSpec {
    /// Range check normalized at construction: reversed bounds are
    /// swapped (inclusivity follows its bound), so
    /// `{lower: 10, upper: 1}` behaves identically to `{lower: 1, upper: 10}`.
    pub fn in_range(lower: f64, upper: f64, lower_inclusive: bool, upper_inclusive: bool) -> Self {
        if lower > upper {
            Self::IsInRange {
                lower: upper,
                upper: lower,
                lower_inclusive: upper_inclusive,
                upper_inclusive: lower_inclusive,
            }
        } else {
            Self::IsInRange {
                lower,
                upper,
                lower_inclusive,
                upper_inclusive,
            }
        }
    }
}

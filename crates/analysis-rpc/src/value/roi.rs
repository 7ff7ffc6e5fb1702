//! Region-of-interest descriptors.
//!
//! Geometry is carried as plain numbers; interpretation (pixel or axis
//! coordinates, degrees or radians) belongs to the analysis engine.
//! Angles are in radians. Non-finite coordinates are allowed and use the
//! same wire form as non-finite scalars.

use crate::wire::float;
use serde::{Deserialize, Serialize};

/// A line segment from `start` with the given length and angle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRoi {
    #[serde(with = "float::pair")]
    pub start: [f64; 2],
    #[serde(with = "float")]
    pub length: f64,
    #[serde(with = "float")]
    pub angle: f64,
    #[serde(default)]
    pub cross_hair: bool,
}

impl LinearRoi {
    pub fn end_point(&self) -> [f64; 2] {
        [
            self.start[0] + self.length * self.angle.cos(),
            self.start[1] + self.length * self.angle.sin(),
        ]
    }
}

/// A rectangle anchored at `start`, rotated by `angle` about that corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectRoi {
    #[serde(with = "float::pair")]
    pub start: [f64; 2],
    #[serde(with = "float::pair")]
    pub lengths: [f64; 2],
    #[serde(with = "float")]
    pub angle: f64,
    #[serde(default)]
    pub clipping_compensation: bool,
}

/// Symmetry applied when integrating a sector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SectorSymmetry {
    #[default]
    None,
    Full,
    XReflect,
    YReflect,
    Clockwise90,
    Anticlockwise90,
    Invert,
}

impl SectorSymmetry {
    pub fn code(&self) -> i32 {
        match self {
            SectorSymmetry::None => 0,
            SectorSymmetry::Full => 1,
            SectorSymmetry::XReflect => 2,
            SectorSymmetry::YReflect => 3,
            SectorSymmetry::Clockwise90 => 4,
            SectorSymmetry::Anticlockwise90 => 5,
            SectorSymmetry::Invert => 6,
        }
    }
}

impl From<SectorSymmetry> for i32 {
    fn from(symmetry: SectorSymmetry) -> Self {
        symmetry.code()
    }
}

impl TryFrom<i32> for SectorSymmetry {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(SectorSymmetry::None),
            1 => Ok(SectorSymmetry::Full),
            2 => Ok(SectorSymmetry::XReflect),
            3 => Ok(SectorSymmetry::YReflect),
            4 => Ok(SectorSymmetry::Clockwise90),
            5 => Ok(SectorSymmetry::Anticlockwise90),
            6 => Ok(SectorSymmetry::Invert),
            other => Err(format!("unknown sector symmetry code {}", other)),
        }
    }
}

/// An annular sector around `centre`, bounded by inner/outer radii and start/end angles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorRoi {
    #[serde(with = "float::pair")]
    pub centre: [f64; 2],
    #[serde(with = "float::pair")]
    pub radii: [f64; 2],
    #[serde(with = "float::pair")]
    pub angles: [f64; 2],
    #[serde(default)]
    pub symmetry: SectorSymmetry,
    #[serde(default)]
    pub combine_symmetry: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointRoi {
    #[serde(with = "float::pair")]
    pub point: [f64; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CircleRoi {
    #[serde(with = "float::pair")]
    pub centre: [f64; 2],
    #[serde(with = "float")]
    pub radius: f64,
}

/// Discriminant of a [`Roi`], used for typed nulls and wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoiKind {
    Linear,
    Rect,
    Sector,
    Point,
    Circle,
}

impl RoiKind {
    pub const ALL: [RoiKind; 5] = [
        RoiKind::Linear,
        RoiKind::Rect,
        RoiKind::Sector,
        RoiKind::Point,
        RoiKind::Circle,
    ];

    /// Wire tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            RoiKind::Linear => crate::wire::tags::ROI_LINEAR,
            RoiKind::Rect => crate::wire::tags::ROI_RECT,
            RoiKind::Sector => crate::wire::tags::ROI_SECTOR,
            RoiKind::Point => crate::wire::tags::ROI_POINT,
            RoiKind::Circle => crate::wire::tags::ROI_CIRCLE,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        RoiKind::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Default-valued region of this kind.
    pub fn default_roi(&self) -> Roi {
        match self {
            RoiKind::Linear => Roi::Linear(LinearRoi::default()),
            RoiKind::Rect => Roi::Rect(RectRoi::default()),
            RoiKind::Sector => Roi::Sector(SectorRoi::default()),
            RoiKind::Point => Roi::Point(PointRoi::default()),
            RoiKind::Circle => Roi::Circle(CircleRoi::default()),
        }
    }
}

/// Region-of-interest descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Roi {
    Linear(LinearRoi),
    Rect(RectRoi),
    Sector(SectorRoi),
    Point(PointRoi),
    Circle(CircleRoi),
}

impl Roi {
    pub fn kind(&self) -> RoiKind {
        match self {
            Roi::Linear(_) => RoiKind::Linear,
            Roi::Rect(_) => RoiKind::Rect,
            Roi::Sector(_) => RoiKind::Sector,
            Roi::Point(_) => RoiKind::Point,
            Roi::Circle(_) => RoiKind::Circle,
        }
    }
}

use crate::ProtocolError;

/// A pixel position in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }
}

/// Axis-aligned box in TLWH form (top-left x, top-left y, width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, rounded down: `(x + width/2, y + height/2)`.
    pub fn center(&self) -> Point {
        Point {
            x: i64::from(self.x) + i64::from(self.width / 2),
            y: i64::from(self.y) + i64::from(self.height / 2),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if `point` lies inside the box, edges included.
    pub fn contains(&self, point: Point) -> bool {
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        point.x >= left
            && point.x <= left + i64::from(self.width)
            && point.y >= top
            && point.y <= top + i64::from(self.height)
    }
}

/// What a decoded block represents, derived from the active algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    Face,
    Object,
    Color,
    Line,
    Tag,
    QRCode,
    Barcode,
}

/// One object or region reported by the sensor in a single frame.
///
/// The center is always derived from the box, so it cannot drift out of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRecord {
    pub kind: DetectionKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Learned identity, `None` when the sensor has not learned this object.
    pub identity: Option<u32>,
}

impl DetectionRecord {
    pub fn new(kind: DetectionKind, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            kind,
            x,
            y,
            width,
            height,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: u32) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        self.bbox().center()
    }

    pub fn area(&self) -> u64 {
        self.bbox().area()
    }

    pub fn contains(&self, point: Point) -> bool {
        self.bbox().contains(point)
    }

    /// Center-to-center distance to another record.
    pub fn distance_to(&self, other: &DetectionRecord) -> f64 {
        self.center().distance(&other.center())
    }
}

/// Pick the record with the largest area; the first one wins on ties.
///
/// Follow-style loops use this as "the nearest target" since bigger usually
/// means closer.
pub fn largest(records: &[DetectionRecord]) -> Option<&DetectionRecord> {
    records.iter().fold(None, |best, r| match best {
        Some(b) if b.area() >= r.area() => Some(b),
        _ => Some(r),
    })
}

/// Default sensor frame size in pixels.
pub const FRAME_WIDTH: u32 = 320;
pub const FRAME_HEIGHT: u32 = 240;

/// Areas below this read as a far target.
pub const FAR_AREA: u64 = 2000;
/// Areas above this read as a near target.
pub const NEAR_AREA: u64 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizontal {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertical {
    Up,
    Center,
    Down,
}

/// How far the target looks, judged by its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proximity {
    /// Small box, move closer.
    Far,
    Hold,
    /// Large box, back off.
    Near,
}

/// Where a target sits in the frame and how close it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Steering {
    pub horizontal: Horizontal,
    pub vertical: Vertical,
    pub proximity: Proximity,
}

/// Classify `record` into thirds of a `frame_width` x `frame_height` frame
/// and into a proximity band by area.
///
/// A center exactly on a third boundary counts as centered.
pub fn steer(record: &DetectionRecord, frame_width: u32, frame_height: u32) -> Steering {
    let center = record.center();
    let (width, height) = (i64::from(frame_width), i64::from(frame_height));
    let (left, right) = (width / 3, 2 * width / 3);
    let (top, bottom) = (height / 3, 2 * height / 3);

    let horizontal = if center.x < left {
        Horizontal::Left
    } else if center.x > right {
        Horizontal::Right
    } else {
        Horizontal::Center
    };
    let vertical = if center.y < top {
        Vertical::Up
    } else if center.y > bottom {
        Vertical::Down
    } else {
        Vertical::Center
    };
    let area = record.area();
    let proximity = if area < FAR_AREA {
        Proximity::Far
    } else if area > NEAR_AREA {
        Proximity::Near
    } else {
        Proximity::Hold
    };

    Steering {
        horizontal,
        vertical,
        proximity,
    }
}

/// A directional line segment reported in line-tracking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrow {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Arrow {
    /// Start of the segment.
    pub fn origin(&self) -> Point {
        Point::new(self.x1.into(), self.y1.into())
    }

    /// End of the segment, where the arrow points.
    pub fn target(&self) -> Point {
        Point::new(self.x2.into(), self.y2.into())
    }
}

bitflags::bitflags! {
    /// Result shapes an algorithm produces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Outputs: u8 {
        const BLOCKS = 1 << 0;
        const ARROWS = 1 << 1;
    }
}

/// Detection algorithm running on the sensor. Exactly one is active at a time.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmMode {
    FaceRecognition = 0x00,
    ObjectTracking = 0x01,
    ObjectRecognition = 0x02,
    LineTracking = 0x03,
    ColorRecognition = 0x04,
    TagRecognition = 0x05,
    ObjectClassification = 0x06,
    QRCode = 0x07,
    Barcode = 0x08,
}

impl AlgorithmMode {
    pub const ALL: [AlgorithmMode; 9] = [
        AlgorithmMode::FaceRecognition,
        AlgorithmMode::ObjectTracking,
        AlgorithmMode::ObjectRecognition,
        AlgorithmMode::LineTracking,
        AlgorithmMode::ColorRecognition,
        AlgorithmMode::TagRecognition,
        AlgorithmMode::ObjectClassification,
        AlgorithmMode::QRCode,
        AlgorithmMode::Barcode,
    ];

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_byte() == byte)
            .ok_or(ProtocolError::UnknownMode(byte))
    }

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmMode::FaceRecognition => "face recognition",
            AlgorithmMode::ObjectTracking => "object tracking",
            AlgorithmMode::ObjectRecognition => "object recognition",
            AlgorithmMode::LineTracking => "line tracking",
            AlgorithmMode::ColorRecognition => "color recognition",
            AlgorithmMode::TagRecognition => "tag recognition",
            AlgorithmMode::ObjectClassification => "object classification",
            AlgorithmMode::QRCode => "QR code",
            AlgorithmMode::Barcode => "barcode",
        }
    }

    /// Kind attached to blocks decoded while this mode is active.
    pub fn detection_kind(self) -> DetectionKind {
        match self {
            AlgorithmMode::FaceRecognition => DetectionKind::Face,
            AlgorithmMode::ObjectTracking
            | AlgorithmMode::ObjectRecognition
            | AlgorithmMode::ObjectClassification => DetectionKind::Object,
            AlgorithmMode::LineTracking => DetectionKind::Line,
            AlgorithmMode::ColorRecognition => DetectionKind::Color,
            AlgorithmMode::TagRecognition => DetectionKind::Tag,
            AlgorithmMode::QRCode => DetectionKind::QRCode,
            AlgorithmMode::Barcode => DetectionKind::Barcode,
        }
    }

    pub fn outputs(self) -> Outputs {
        match self {
            AlgorithmMode::LineTracking => Outputs::ARROWS,
            _ => Outputs::BLOCKS,
        }
    }
}

impl std::fmt::Display for AlgorithmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

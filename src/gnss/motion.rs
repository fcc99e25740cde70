//! Motion-pattern classification from course-over-ground changes.

/// Motion category derived from successive course readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionStatus {
    StraightLine,
    Curve,
    UTurn,
}

/// Course change below which driving counts as straight, degrees.
const CURVE_ANGLE: f32 = 4.0;
/// Course change above which the vehicle is turning around, degrees.
const UTURN_ANGLE: f32 = 30.0;
/// Minimum speed for a wide-radius curve, km/h.
const CURVE_SPEED_FLOOR: f32 = 20.0;
/// Maximum speed at which a u-turn is plausible, km/h.
const UTURN_SPEED_CEILING: f32 = 40.0;

/// Classifies the newest course reading against the remembered one.
///
/// The course delta is a plain absolute difference: headings straddling the
/// 0°/360° wrap read as a near-maximal change, so a small wiggle around due
/// north can classify as a u-turn. Known quirk, kept as-is. The two speed
/// bands overlap between 20 and 40 km/h; the u-turn check wins there.
#[derive(Debug, Clone, Default)]
pub struct MotionClassifier {
    previous_cog: Option<f32>,
}

impl MotionClassifier {
    pub const fn new() -> Self {
        Self { previous_cog: None }
    }

    /// One classification step. The first call only seeds the course memo
    /// and reports a straight line, so a cold start cannot fabricate a
    /// transition; the memo is updated on every call after that.
    pub fn classify(&mut self, course: f32, speed_kmh: f32) -> MotionStatus {
        let Some(previous) = self.previous_cog.replace(course) else {
            return MotionStatus::StraightLine;
        };

        let delta = abs(course - previous);
        if speed_kmh <= UTURN_SPEED_CEILING && delta > UTURN_ANGLE {
            MotionStatus::UTurn
        } else if speed_kmh >= CURVE_SPEED_FLOOR && delta > CURVE_ANGLE && delta < UTURN_ANGLE {
            MotionStatus::Curve
        } else {
            MotionStatus::StraightLine
        }
    }
}

// f32::abs lives in std; keep the classifier buildable without it.
fn abs(value: f32) -> f32 {
    if value < 0.0 {
        -value
    } else {
        value
    }
}

/// Current and previous committed categories plus the classifier memo, all
/// guarded by the movement lock.
#[derive(Debug)]
pub struct MotionState {
    pub current: MotionStatus,
    pub previous: MotionStatus,
    pub classifier: MotionClassifier,
}

impl MotionState {
    pub const fn new() -> Self {
        Self {
            current: MotionStatus::StraightLine,
            previous: MotionStatus::StraightLine,
            classifier: MotionClassifier::new(),
        }
    }
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new()
    }
}

//! OpCode registry for the register VM
//!
//! The registry below is the single source of the opcode name → code
//! mapping. The host encoder, the CPU reference VM and the generated
//! device dispatch table (see [`super::wgsl`]) all read it, so host and
//! device can never drift apart.
//!
//! Author: Moroya Sakamoto

use crate::kernels::{operations, primitives, transforms, Kernel};

/// Number of dependencies an opcode consumes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    /// No inputs (only the evaluation point leaf)
    Nullary,
    /// One input register
    Unary,
    /// Two input registers, order significant
    Binary,
    /// Associative-commutative reduction over two or more inputs.
    ///
    /// The scheduler is free to fold these into any binary nesting.
    Associative,
}

impl Arity {
    /// Check a dependency count against this arity
    pub const fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Nullary => count == 0,
            Arity::Unary => count == 1,
            Arity::Binary => count == 2,
            Arity::Associative => count >= 2,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Nullary => write!(f, "no dependencies"),
            Arity::Unary => write!(f, "1 dependency"),
            Arity::Binary => write!(f, "2 dependencies"),
            Arity::Associative => write!(f, "2 or more dependencies"),
        }
    }
}

/// Parameter word layout of an opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamLayout {
    /// Exactly this many f32 words follow the instruction
    Fixed(usize),
    /// A u32 length word followed by that many f32 words
    Variadic,
}

impl ParamLayout {
    /// Check a parameter count against this layout
    pub const fn accepts(self, count: usize) -> bool {
        match self {
            ParamLayout::Fixed(n) => count == n,
            ParamLayout::Variadic => true,
        }
    }
}

impl std::fmt::Display for ParamLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamLayout::Fixed(n) => write!(f, "{} parameters", n),
            ParamLayout::Variadic => write!(f, "a variable number of parameters"),
        }
    }
}

macro_rules! opcode_registry {
    ($(
        $(#[$doc:meta])*
        $variant:ident = $code:literal, $name:literal, $arity:ident, $params:expr, $kernel:path;
    )*) => {
        /// Operation codes of the register VM
        ///
        /// Codes 0 and 1 are reserved: `Return` halts the program and
        /// `Point` is the evaluation point leaf that seeds register 0.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum OpCode {
            /// Copy input register 1 to the output and halt
            Return = 0,
            /// Evaluation point; never encoded, seeds register 0
            Point = 1,
            $( $(#[$doc])* $variant = $code, )*
        }

        impl OpCode {
            /// Every registered opcode, in code order
            pub const ALL: &'static [OpCode] = &[
                OpCode::Return,
                OpCode::Point,
                $( OpCode::$variant, )*
            ];

            /// Decode a code byte
            pub const fn from_code(code: u8) -> Option<OpCode> {
                match code {
                    0 => Some(OpCode::Return),
                    1 => Some(OpCode::Point),
                    $( $code => Some(OpCode::$variant), )*
                    _ => None,
                }
            }

            /// Registry name, shared with the device dispatch table
            pub const fn name(self) -> &'static str {
                match self {
                    OpCode::Return => "return",
                    OpCode::Point => "point",
                    $( OpCode::$variant => $name, )*
                }
            }

            /// Dependency arity
            pub const fn arity(self) -> Arity {
                match self {
                    OpCode::Return => Arity::Unary,
                    OpCode::Point => Arity::Nullary,
                    $( OpCode::$variant => Arity::$arity, )*
                }
            }

            /// Parameter layout
            pub const fn params(self) -> ParamLayout {
                match self {
                    OpCode::Return | OpCode::Point => ParamLayout::Fixed(0),
                    $( OpCode::$variant => $params, )*
                }
            }

            /// CPU kernel implementing this opcode (`None` for reserved codes)
            pub fn kernel(self) -> Option<Kernel> {
                match self {
                    OpCode::Return | OpCode::Point => None,
                    $( OpCode::$variant => Some($kernel as Kernel), )*
                }
            }
        }
    };
}

opcode_registry! {
    /// 2D rectangle: [half_x, half_y]
    Rectangle = 2, "rectangle", Unary, ParamLayout::Fixed(2), primitives::rectangle;
    /// 2D circle: [radius]
    Circle = 3, "circle", Unary, ParamLayout::Fixed(1), primitives::circle;
    /// 2D polygon: [x0, y0, x1, y1, ...]
    Polygon2d = 4, "polygon2d", Unary, ParamLayout::Variadic, primitives::polygon2d;
    /// Sphere: [radius]
    Sphere = 5, "sphere", Unary, ParamLayout::Fixed(1), primitives::sphere;
    /// Box: [half_x, half_y, half_z]
    Box3d = 6, "box", Unary, ParamLayout::Fixed(3), primitives::box3d;
    /// Cylinder along Z: [radius, height]
    Cylinder = 7, "cylinder", Unary, ParamLayout::Fixed(2), primitives::cylinder;
    /// Extrusion of a 2D value along Z: [height]; inputs (profile, point)
    Extrusion = 8, "extrusion", Binary, ParamLayout::Fixed(1), transforms::extrusion;
    /// Fold a point into the revolution half plane
    RevolutionTo = 9, "revolution_to", Unary, ParamLayout::Fixed(0), transforms::revolution_to;
    /// Unfold a revolved 2D value; inputs (profile, point)
    RevolutionFrom = 10, "revolution_from", Binary, ParamLayout::Fixed(0), transforms::revolution_from;
    /// Union: [r], r <= 0 is sharp
    Union = 11, "union", Associative, ParamLayout::Fixed(1), operations::union;
    /// Intersection: [r], r <= 0 is sharp
    Intersection = 12, "intersection", Associative, ParamLayout::Fixed(1), operations::intersection;
    /// Subtraction of input 2 from input 1: [r]
    Subtraction = 13, "subtraction", Binary, ParamLayout::Fixed(1), operations::subtraction;
    /// Offset: [distance]
    Offset = 14, "offset", Unary, ParamLayout::Fixed(1), operations::offset;
    /// Shell: [half_thickness]
    Shell = 15, "shell", Unary, ParamLayout::Fixed(1), operations::shell;
    /// Point mapping: [qx, qy, qz, qw, scale, tx, ty, tz]
    TransformationTo = 16, "transformation_to", Unary, ParamLayout::Fixed(8), transforms::transformation_to;
    /// Value mapping: [qx, qy, qz, qw, scale]
    TransformationFrom = 17, "transformation_from", Unary, ParamLayout::Fixed(5), transforms::transformation_from;
}

impl OpCode {
    /// Encoded code byte
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up an opcode by registry name
    pub fn from_name(name: &str) -> Option<OpCode> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Check if this code is reserved (never a schedulable operation)
    #[inline]
    pub const fn is_reserved(self) -> bool {
        matches!(self, OpCode::Return | OpCode::Point)
    }

    /// Check if this opcode is a shape primitive
    #[inline]
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            OpCode::Rectangle
                | OpCode::Circle
                | OpCode::Polygon2d
                | OpCode::Sphere
                | OpCode::Box3d
                | OpCode::Cylinder
        )
    }

    /// Check if this opcode maps the evaluation point rather than a value
    #[inline]
    pub const fn is_point_mapping(self) -> bool {
        matches!(self, OpCode::TransformationTo | OpCode::RevolutionTo)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

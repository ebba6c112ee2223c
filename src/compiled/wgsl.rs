//! WGSL dispatch table for the register VM (Deep Fried Edition)
//!
//! Generates the device half of the VM from the same opcode registry the
//! encoder uses: the `OP_*` constants, the instruction decode loop and the
//! `switch` that routes each opcode to its kernel. Kernel bodies are not
//! generated here; each one is provided by the kernel library with the
//! signature
//!
//! ```text
//! fn <name>_op(params: u32, input1: vec4<f32>, input2: vec4<f32>, point: vec3<f32>) -> vec4<f32>
//! ```
//!
//! where `params` is the word index of the first parameter in `program`.
//! Variadic opcodes take an extra `count: u32` right after `params`.
//!
//! # Deep Fried Optimizations
//! - **Word-Packed Header**: One `u32` load per instruction, fields split
//!   with shifts and masks.
//! - **No Host Drift**: Codes are emitted from the registry, never typed.
//!
//! Author: Moroya Sakamoto

use super::opcode::{OpCode, ParamLayout};

/// Generated dispatch source
#[derive(Debug, Clone)]
pub struct WgslDispatch {
    /// WGSL source of the constants and `vm_eval`
    pub source: String,
    /// Register file size baked into `vm_eval`
    pub register_count: usize,
}

impl WgslDispatch {
    /// Generate the dispatch loop for a register file of `register_count`
    pub fn generate(register_count: usize) -> Self {
        let register_count = register_count.max(1);
        let mut source = String::new();
        source.push_str("// ALICE-CSG register VM dispatch, generated from the opcode registry\n\n");
        source.push_str(&opcode_constants());
        source.push_str(&format!(
            "\nconst REGISTER_COUNT: u32 = {}u;\n\n",
            register_count
        ));
        source.push_str("@group(0) @binding(3) var<storage, read> program: array<u32>;\n\n");
        source.push_str("fn vm_param(index: u32) -> f32 {\n    return bitcast<f32>(program[index]);\n}\n\n");
        source.push_str("fn vm_eval(point: vec3<f32>) -> vec4<f32> {\n");
        source.push_str(&format!(
            "    var registers: array<vec4<f32>, {}>;\n",
            register_count
        ));
        source.push_str(
            "    registers[0] = vec4<f32>(point, 0.0);\n\
             \x20   var pc: u32 = 0u;\n\
             \x20   loop {\n\
             \x20       let word = program[pc];\n\
             \x20       let opcode = word & 0xffu;\n\
             \x20       let output = (word >> 8u) & 0xffu;\n\
             \x20       let input1 = (word >> 16u) & 0xffu;\n\
             \x20       let input2 = (word >> 24u) & 0xffu;\n\
             \x20       pc = pc + 1u;\n\
             \x20       switch opcode {\n",
        );
        for &op in OpCode::ALL {
            source.push_str(&dispatch_case(op));
        }
        source.push_str(
            "            default: {\n\
             \x20               return vec4<f32>(0.0, 0.0, 0.0, 3.4e38);\n\
             \x20           }\n\
             \x20       }\n\
             \x20   }\n\
             }\n",
        );
        WgslDispatch {
            source,
            register_count,
        }
    }

    /// Wrap the dispatch loop in a batch compute shader
    pub fn to_compute_shader(&self) -> String {
        format!(
            r#"// ALICE-CSG Generated Compute Shader
// Runs the register VM once per input point

struct InputPoint {{
    x: f32,
    y: f32,
    z: f32,
    _pad: f32,
}}

@group(0) @binding(0) var<storage, read> input_points: array<InputPoint>;
@group(0) @binding(1) var<storage, read_write> output_values: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> point_count: u32;

{}
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let idx = global_id.x;
    if (idx >= point_count) {{
        return;
    }}

    let point = input_points[idx];
    output_values[idx] = vm_eval(vec3<f32>(point.x, point.y, point.z));
}}
"#,
            self.source
        )
    }
}

/// `const OP_<NAME>: u32 = <code>u;` for every registered opcode
pub fn opcode_constants() -> String {
    OpCode::ALL
        .iter()
        .map(|op| {
            format!(
                "const OP_{}: u32 = {}u;\n",
                op.name().to_ascii_uppercase(),
                op.code()
            )
        })
        .collect()
}

fn dispatch_case(op: OpCode) -> String {
    let name = op.name();
    match op {
        OpCode::Return => "            case OP_RETURN: {\n                return registers[input1];\n            }\n".to_string(),
        OpCode::Point => String::new(),
        _ => match op.params() {
            ParamLayout::Fixed(n) => format!(
                "            case OP_{upper}: {{\n\
                 \x20               registers[output] = {name}_op(pc, registers[input1], registers[input2], point);\n\
                 \x20               pc = pc + {n}u;\n\
                 \x20           }}\n",
                upper = name.to_ascii_uppercase(),
            ),
            ParamLayout::Variadic => format!(
                "            case OP_{upper}: {{\n\
                 \x20               let count = program[pc];\n\
                 \x20               registers[output] = {name}_op(pc + 1u, count, registers[input1], registers[input2], point);\n\
                 \x20               pc = pc + 1u + count;\n\
                 \x20           }}\n",
                upper = name.to_ascii_uppercase(),
            ),
        },
    }
}

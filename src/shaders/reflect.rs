use std::collections::BTreeMap;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, ImageClass, ImageDimension, ScalarKind, ShaderStage, TypeInner, VectorSize};

use super::ShaderStyle;
use crate::error::ConfigurationError;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Host-side values a shader may declare in bind group 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderInput {
    Time,
    Resolution,
    Bass,
    Kick,
    MixFactor,
    SceneCurrent,
    SceneNext,
    SceneSampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Float,
    Vec2,
    Texture,
    Sampler,
}

impl ShaderInput {
    pub const ALL: [ShaderInput; 8] = [
        ShaderInput::Time,
        ShaderInput::Resolution,
        ShaderInput::Bass,
        ShaderInput::Kick,
        ShaderInput::MixFactor,
        ShaderInput::SceneCurrent,
        ShaderInput::SceneNext,
        ShaderInput::SceneSampler,
    ];

    /// Global variable name the shader uses for this input.
    pub fn name(self) -> &'static str {
        match self {
            ShaderInput::Time => "iTime",
            ShaderInput::Resolution => "iResolution",
            ShaderInput::Bass => "iBass",
            ShaderInput::Kick => "kick",
            ShaderInput::MixFactor => "mix_factor",
            ShaderInput::SceneCurrent => "scene_current",
            ShaderInput::SceneNext => "scene_next",
            ShaderInput::SceneSampler => "scene_sampler",
        }
    }

    pub fn kind(self) -> InputKind {
        match self {
            ShaderInput::Time | ShaderInput::Bass | ShaderInput::Kick | ShaderInput::MixFactor => {
                InputKind::Float
            }
            ShaderInput::Resolution => InputKind::Vec2,
            ShaderInput::SceneCurrent | ShaderInput::SceneNext => InputKind::Texture,
            ShaderInput::SceneSampler => InputKind::Sampler,
        }
    }

    pub fn from_name(name: &str) -> Option<ShaderInput> {
        ShaderInput::ALL.into_iter().find(|input| input.name() == name)
    }
}

/// Binding slot of every input the shader declares. Inputs it leaves out
/// are simply absent and never bound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformSlots {
    slots: BTreeMap<ShaderInput, u32>,
}

impl UniformSlots {
    pub fn get(&self, input: ShaderInput) -> Option<u32> {
        self.slots.get(&input).copied()
    }

    pub fn contains(&self, input: ShaderInput) -> bool {
        self.slots.contains_key(&input)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShaderInput, u32)> + '_ {
        self.slots.iter().map(|(&input, &slot)| (input, slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when the shader samples at least one scene texture.
    pub fn uses_scenes(&self) -> bool {
        self.contains(ShaderInput::SceneCurrent) || self.contains(ShaderInput::SceneNext)
    }
}

/// Parse and validate a combined WGSL module, then resolve its input slots.
pub fn compile_shader(style: ShaderStyle, source: &str) -> Result<UniformSlots, ConfigurationError> {
    let compile_error = |message: String| ConfigurationError::ShaderCompile {
        style: style.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(source).map_err(|e| compile_error(e.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    for (entry, stage) in [(VERTEX_ENTRY, ShaderStage::Vertex), (FRAGMENT_ENTRY, ShaderStage::Fragment)] {
        if !module.entry_points.iter().any(|ep| ep.name == entry && ep.stage == stage) {
            return Err(compile_error(format!("missing {:?} entry point '{}'", stage, entry)));
        }
    }

    reflect_inputs(&module).map_err(compile_error)
}

fn reflect_inputs(module: &naga::Module) -> Result<UniformSlots, String> {
    let mut slots = UniformSlots::default();

    for (_, var) in module.global_variables.iter() {
        let Some(ref binding) = var.binding else {
            continue;
        };
        let name = var.name.as_deref().unwrap_or("<unnamed>");

        if binding.group != 0 {
            return Err(format!("'{}' is in bind group {}; only group 0 is bound", name, binding.group));
        }
        let Some(input) = ShaderInput::from_name(name) else {
            return Err(format!("unsupported binding '{}' at slot {}", name, binding.binding));
        };

        let inner = &module.types[var.ty].inner;
        if !kind_matches(input.kind(), var.space, inner) {
            return Err(format!("'{}' must be declared as {}", name, expected_decl(input.kind())));
        }

        log::debug!("Shader input '{}' -> binding {}", name, binding.binding);
        slots.slots.insert(input, binding.binding);
    }

    Ok(slots)
}

fn kind_matches(kind: InputKind, space: AddressSpace, inner: &TypeInner) -> bool {
    match kind {
        InputKind::Float => {
            space == AddressSpace::Uniform && matches!(inner, TypeInner::Scalar(s) if *s == naga::Scalar::F32)
        }
        InputKind::Vec2 => {
            space == AddressSpace::Uniform
                && matches!(inner, TypeInner::Vector { size: VectorSize::Bi, scalar } if *scalar == naga::Scalar::F32)
        }
        InputKind::Texture => matches!(
            inner,
            TypeInner::Image {
                dim: ImageDimension::D2,
                arrayed: false,
                class: ImageClass::Sampled {
                    kind: ScalarKind::Float,
                    multi: false
                }
            }
        ),
        InputKind::Sampler => matches!(inner, TypeInner::Sampler { comparison: false }),
    }
}

fn expected_decl(kind: InputKind) -> &'static str {
    match kind {
        InputKind::Float => "var<uniform> f32",
        InputKind::Vec2 => "var<uniform> vec2<f32>",
        InputKind::Texture => "texture_2d<f32>",
        InputKind::Sampler => "sampler",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::loader::embedded_shader;

    const MINIMAL_FRAGMENT: &str = r#"
@group(0) @binding(3) var<uniform> iTime: f32;

@fragment
fn fs_main(vin: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(vin.uv, 0.5 + 0.5 * sin(iTime), 1.0);
}
"#;

    fn with_vertex(fragment: &str) -> String {
        format!("{}\n{}", crate::shaders::embedded::COMMON_VERTEX_WGSL, fragment)
    }

    #[test]
    fn builtin_styles_compile() {
        for style in ShaderStyle::ALL {
            let source = embedded_shader(style).combined();
            let slots = compile_shader(style, &source)
                .unwrap_or_else(|e| panic!("{} failed: {}", style, e));
            assert_eq!(slots.get(ShaderInput::Time), Some(0));
            assert_eq!(slots.get(ShaderInput::Resolution), Some(1));
            assert_eq!(slots.get(ShaderInput::MixFactor), Some(4));
            assert!(slots.uses_scenes());
        }
    }

    #[test]
    fn undeclared_inputs_have_no_slot() {
        let source = embedded_shader(ShaderStyle::StormWarp).combined();
        let slots = compile_shader(ShaderStyle::StormWarp, &source).unwrap();
        assert_eq!(slots.get(ShaderInput::Kick), None);
        assert_eq!(slots.get(ShaderInput::Bass), Some(2));

        let slots = compile_shader(ShaderStyle::FractalBlob, &with_vertex(MINIMAL_FRAGMENT)).unwrap();
        assert_eq!(slots.iter().collect::<Vec<_>>(), vec![(ShaderInput::Time, 3)]);
        assert!(!slots.uses_scenes());
    }

    #[test]
    fn syntax_errors_are_compile_errors() {
        let source = with_vertex("@fragment fn fs_main( -> {");
        let err = compile_shader(ShaderStyle::GridGlitch, &source).unwrap_err();
        assert!(matches!(err, ConfigurationError::ShaderCompile { ref style, .. } if style == "grid_glitch"));
    }

    #[test]
    fn missing_fragment_entry_is_rejected() {
        let source = with_vertex(&MINIMAL_FRAGMENT.replace("fs_main", "main_fs"));
        let err = compile_shader(ShaderStyle::TunnelWave, &source).unwrap_err();
        assert!(err.to_string().contains("fs_main"));
    }

    #[test]
    fn mistyped_input_is_rejected() {
        let fragment = MINIMAL_FRAGMENT.replace("var<uniform> iTime: f32", "var<uniform> iTime: vec4<f32>");
        let fragment = fragment.replace("sin(iTime)", "sin(iTime.x)");
        let err = compile_shader(ShaderStyle::TunnelWave, &with_vertex(&fragment)).unwrap_err();
        assert!(err.to_string().contains("iTime"));
    }

    #[test]
    fn unknown_binding_is_rejected() {
        let fragment = format!("@group(0) @binding(9) var<uniform> iMouse: vec2<f32>;\n{}", MINIMAL_FRAGMENT);
        let err = compile_shader(ShaderStyle::TunnelWave, &with_vertex(&fragment)).unwrap_err();
        assert!(err.to_string().contains("iMouse"));
    }
}

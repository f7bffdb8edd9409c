/// Default WGSL vertex stage: transforms a lit mesh by `model`, `view` and
/// `projection`.
pub const WORLD_VERT_WGSL: &str = r#"
@group(0) @binding(0)
var<uniform> model: mat4x4<f32>;
@group(0) @binding(1)
var<uniform> view: mat4x4<f32>;
@group(0) @binding(2)
var<uniform> projection: mat4x4<f32>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let world_pos = model * vec4<f32>(vertex.position, 1.0);
    let world_normal = (model * vec4<f32>(vertex.normal, 0.0)).xyz;

    var out: VertexOutput;
    out.clip_position = projection * view * world_pos;
    out.world_normal = normalize(world_normal);
    out.world_position = world_pos.xyz;
    return out;
}
"#;

/// Default WGSL fragment stage: ambient + single directional light.
pub const WORLD_FRAG_WGSL: &str = r#"
struct FragmentInput {
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
};

@fragment
fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(0.3, 1.0, 0.5));
    let base_color = vec3<f32>(0.2, 0.6, 1.0);
    let ambient = 0.3;
    let diffuse = max(dot(normalize(input.world_normal), light_dir), 0.0);
    let lighting = ambient + diffuse * 0.7;
    return vec4<f32>(base_color * lighting, 1.0);
}
"#;

/// File names `hotshade-cli init` and the viewer use for the default pair.
pub const WORLD_VERT_FILE: &str = "world.vert.wgsl";
pub const WORLD_FRAG_FILE: &str = "world.frag.wgsl";

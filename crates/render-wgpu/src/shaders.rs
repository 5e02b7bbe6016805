/// WGSL shader for lit meshes, single or instanced.
///
/// Every draw reads its model matrices from the per-instance vertex buffer;
/// a plain mesh is a batch of one.
pub const MESH_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    // xyz: direction towards the light
    light_dir: vec4<f32>,
    // rgb: color * intensity
    light_color: vec4<f32>,
    // x: shadows enabled, y: normal bias, z: texel size
    shadow: vec4<f32>,
};

struct DrawParams {
    color: vec4<f32>,
    // x: 0 standard, 1 normal; y: receives shadows
    flags: vec4<u32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;
@group(0) @binding(1)
var shadow_map: texture_depth_2d;
@group(0) @binding(2)
var shadow_sampler: sampler_comparison;

@group(1) @binding(0)
var<uniform> params: DrawParams;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    let world_pos = model * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = globals.view_proj * world_pos;
    out.world_pos = world_pos.xyz;
    out.world_normal = normalize((model * vec4<f32>(vertex.normal, 0.0)).xyz);
    return out;
}

fn shadow_factor(world_pos: vec3<f32>, normal: vec3<f32>) -> f32 {
    let biased = world_pos + normal * globals.shadow.y;
    let clip = globals.light_view_proj * vec4<f32>(biased, 1.0);
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    // 3x3 PCF
    var lit = 0.0;
    for (var y = -1; y <= 1; y++) {
        for (var x = -1; x <= 1; x++) {
            let offset = vec2<f32>(f32(x), f32(y)) * globals.shadow.z;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, ndc.z);
        }
    }
    let outside = any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z > 1.0;
    return select(lit / 9.0, 1.0, outside);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(in.world_normal);

    if (params.flags.x == 1u) {
        let view_normal = normalize((globals.view * vec4<f32>(normal, 0.0)).xyz);
        return vec4<f32>(view_normal * 0.5 + 0.5, 1.0);
    }

    var shadow = 1.0;
    if (globals.shadow.x > 0.5 && params.flags.y == 1u) {
        shadow = shadow_factor(in.world_pos, normal);
    }
    let ambient = 0.3;
    let diffuse = max(dot(normal, globals.light_dir.xyz), 0.0) * shadow;
    let lighting = vec3<f32>(ambient) + globals.light_color.rgb * diffuse * 0.7;
    return vec4<f32>(params.color.rgb * lighting, params.color.a);
}
"#;

/// Depth-only WGSL shader for the shadow pass.
pub const SHADOW_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
    light_color: vec4<f32>,
    shadow: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
};

@vertex
fn vs_shadow(@location(0) position: vec3<f32>, instance: InstanceInput) -> @builtin(position) vec4<f32> {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    return globals.light_view_proj * model * vec4<f32>(position, 1.0);
}
"#;

/// Unlit WGSL shader for [`MaterialDesc::Displaced`](perfscene_assets::MaterialDesc).
///
/// All work happens per vertex: the height lifts the world-space Y and picks
/// the colour, the fragment stage only writes the interpolated colour.
/// `DISPLACEMENT_STRENGTH` and `HEIGHT_QUANTUM` are pipeline-overridable
/// constants, so changing either builds a new pipeline.
pub const DISPLACED_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
    light_color: vec4<f32>,
    shadow: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

override DISPLACEMENT_STRENGTH: f32 = 1.5;
// 0 keeps full precision
override HEIGHT_QUANTUM: f32 = 0.0;

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

fn quantize(value: f32) -> f32 {
    if (HEIGHT_QUANTUM > 0.0) {
        return round(value / HEIGHT_QUANTUM) * HEIGHT_QUANTUM;
    }
    return value;
}

// Procedural stand-in for a displacement map, in [0, 1].
fn height(p: vec2<f32>) -> f32 {
    let q = vec2<f32>(quantize(p.x), quantize(p.y));
    return quantize(0.5 + 0.5 * sin(q.x * 1.3) * cos(q.y * 1.7));
}

@vertex
fn vs_displaced(@location(0) position: vec3<f32>, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    let elevation = height(position.xy);
    var world = model * vec4<f32>(position, 1.0);
    world.y += max(elevation, 0.5) * DISPLACEMENT_STRENGTH;

    var out: VertexOutput;
    out.clip_position = globals.view_proj * world;
    out.color = mix(vec3<f32>(1.0, 0.1, 0.1), vec3<f32>(0.1, 0.0, 0.5), max(elevation, 0.25));
    return out;
}

@fragment
fn fs_displaced(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

//! Renders a Cornell box with a mirror ball and an area light.
//!
//! Usage: `cargo run --release --example cornell_box -- [output.png] [config.json]`

use anyhow::{Context, Result};
use lumen_core::{Color, ParamList, SceneBuilder, ShaderRef, SurfaceBinding};
use lumen_math::{Transform, Vec3};
use lumen_renderer::{
    render, Background, InstancedAccelerator, Material, PerspectiveCamera, ReferenceShading,
    RenderConfig,
};

fn box_walls() -> Result<ParamList> {
    #[rustfmt::skip]
    let corners: Vec<f32> = vec![
        -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,   1.0, -1.0, 1.0,   -1.0, -1.0, 1.0,
        -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0, 1.0,   -1.0,  1.0, 1.0,
    ];
    // floor, ceiling, back, left, right
    #[rustfmt::skip]
    let colors: Vec<f32> = vec![
        0.73, 0.73, 0.73,
        0.73, 0.73, 0.73,
        0.73, 0.73, 0.73,
        0.65, 0.05, 0.05,
        0.12, 0.45, 0.15,
    ];
    Ok(ParamList::new()
        .with("vertex point P", corners)?
        .with("uniform color Cs", colors)?)
}

const WALL_FACES: [i32; 5] = [4, 4, 4, 4, 4];
#[rustfmt::skip]
const WALL_INDICES: [i32; 20] = [
    0, 1, 2, 3,
    4, 7, 6, 5,
    3, 2, 6, 7,
    0, 3, 7, 4,
    1, 5, 6, 2,
];

fn build_scene() -> Result<lumen_core::Scene<InstancedAccelerator>> {
    let mut builder = SceneBuilder::new();

    builder.mesh(&WALL_FACES, &WALL_INDICES, &box_walls()?, &SurfaceBinding::new("walls"))?;

    // Light just below the ceiling, facing down
    let light = ParamList::new()
        .with(
            "vertex point P",
            vec![
                -0.3f32, 0.99, -0.3, 0.3, 0.99, -0.3, 0.3, 0.99, 0.3, -0.3, 0.99, 0.3,
            ],
        )?
        .with("int emissive", 1)?;
    builder.mesh(&[4], &[0, 1, 2, 3], &light, &SurfaceBinding::new("light"))?;

    let mirror = SurfaceBinding::new("mirror")
        .with_transform(Transform::translate(Vec3::new(-0.4, -0.6, 0.3)));
    builder.sphere(0.4, &ParamList::new(), &mirror)?;

    let ball = SurfaceBinding::new("matte").with_transform(
        Transform::translate(Vec3::new(0.45, -0.7, -0.25)) * Transform::scale(Vec3::splat(0.3))?,
    );
    builder.sphere(1.0, &ParamList::new(), &ball)?;

    Ok(builder.build(InstancedAccelerator::new()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "cornell_box.png".to_string());
    let config = match args.next() {
        Some(path) => RenderConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => RenderConfig::default(),
    };

    let scene = build_scene()?;

    let shading = ReferenceShading::new()
        .with_material("walls", Material::Diffuse { albedo: Color::ONE })
        .with_material("matte", Material::Diffuse { albedo: Color::new(0.8, 0.8, 0.6) })
        .with_material("mirror", Material::Mirror { albedo: Color::splat(0.95) })
        .with_material(
            "light",
            Material::Emitter {
                radiance: Color::splat(15.0),
                albedo: Color::splat(0.5),
            },
        )
        .with_background("night", Background::Constant(Color::new(0.01, 0.01, 0.02)));
    shading.report_missing(scene.primitives().iter().map(|p| p.shader()));

    let eye = Vec3::new(0.0, 0.0, -3.4);
    let camera_to_world = Transform::look_at(eye, Vec3::ZERO, Vec3::Y)?;
    let camera_params = ParamList::new()
        .with("int resolution", vec![400i32, 400])?
        .with("float fov", 40.0f32)?;
    let camera = PerspectiveCamera::from_params(camera_to_world, &camera_params)?;

    let image = render(&scene, &camera, Some(&ShaderRef::new("night")), &shading, &config);
    image.save(&output)?;
    log::info!("Saved {}", output);
    Ok(())
}

//! The `THREE` namespace plus the scene, camera, renderer and registry
//! handles, exposed with three.js names so generated snippets read the way
//! they would in a browser.

use glam::DVec3;
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, FLOAT, INT};

use super::{number, numbers, ScriptResult};
use crate::{
    canvas::{hsl_to_rgb, parse_css_color, Rgba},
    render::RendererHandle,
    scene::{
        CameraHandle, Geometry, Light, LightKind, Material, MaterialKind, Object3d,
        Object3dHandle, ObjectKind, ObjectRegistry, SceneHandle,
    },
};

/// Value bound to `THREE`; its methods are the constructors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeNamespace;

pub(super) fn register(engine: &mut Engine) {
    register_namespace(engine);
    register_values(engine);
    register_objects(engine);
    register_scene(engine);
    register_camera(engine);
    register_renderer(engine);
    register_registry(engine);
}

/// Accepts a `Color`, a hex int or a CSS colour string.
fn color_value(value: &Dynamic) -> ScriptResult<Rgba> {
    if let Some(color) = value.clone().try_cast::<Rgba>() {
        return Ok(color);
    }
    if let Ok(hex) = value.as_int() {
        return Ok(Rgba::from_hex(hex as u32));
    }
    if let Ok(text) = value.clone().into_immutable_string() {
        return parse_css_color(&text).ok_or_else(|| format!("unrecognised colour '{text}'").into());
    }
    Err(format!("expected a colour, got {}", value.type_name()).into())
}

fn material(kind: MaterialKind, params: &Map) -> ScriptResult<Material> {
    let mut material = Material::new(kind);
    if let Some(color) = params.get("color") {
        material.color = color_value(color)?;
    }
    if let Some(emissive) = params.get("emissive") {
        material.emissive = color_value(emissive)?;
    }
    let transparent = params
        .get("transparent")
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(false);
    if let (true, Some(opacity)) = (transparent, params.get("opacity")) {
        material.opacity = number("opacity", opacity)?.clamp(0.0, 1.0);
    }
    Ok(material)
}

fn light(kind: LightKind, color: &Dynamic, intensity: f64) -> ScriptResult<Object3dHandle> {
    let color = color_value(color)?;
    Ok(Object3dHandle::new(Object3d::new(ObjectKind::Light(Light {
        kind,
        color,
        intensity,
    }))))
}

fn mesh(geometry: Geometry, material: Material) -> Object3dHandle {
    Object3dHandle::new(Object3d::new(ObjectKind::Mesh { geometry, material }))
}

fn register_namespace(engine: &mut Engine) {
    engine
        .register_type_with_name::<ThreeNamespace>("THREE")
        .register_fn("BoxGeometry", |_: &mut ThreeNamespace| Geometry::Box {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
        })
        .register_fn(
            "BoxGeometry",
            |_: &mut ThreeNamespace, w: Dynamic, h: Dynamic, d: Dynamic| -> ScriptResult<Geometry> {
                let [width, height, depth] = numbers("BoxGeometry", [&w, &h, &d])?;
                Ok(Geometry::Box {
                    width,
                    height,
                    depth,
                })
            },
        )
        .register_fn(
            "SphereGeometry",
            |_: &mut ThreeNamespace, r: Dynamic| -> ScriptResult<Geometry> {
                Ok(Geometry::Sphere {
                    radius: number("SphereGeometry", &r)?,
                    width_segments: 32,
                    height_segments: 16,
                })
            },
        )
        .register_fn(
            "SphereGeometry",
            |_: &mut ThreeNamespace, r: Dynamic, ws: Dynamic, hs: Dynamic| -> ScriptResult<Geometry> {
                let [radius, ws, hs] = numbers("SphereGeometry", [&r, &ws, &hs])?;
                Ok(Geometry::Sphere {
                    radius,
                    width_segments: (ws as u32).max(3),
                    height_segments: (hs as u32).max(2),
                })
            },
        )
        .register_fn(
            "PlaneGeometry",
            |_: &mut ThreeNamespace, w: Dynamic, h: Dynamic| -> ScriptResult<Geometry> {
                let [width, height] = numbers("PlaneGeometry", [&w, &h])?;
                Ok(Geometry::Plane { width, height })
            },
        )
        .register_fn("MeshBasicMaterial", |_: &mut ThreeNamespace| {
            Material::new(MaterialKind::Basic)
        })
        .register_fn(
            "MeshBasicMaterial",
            |_: &mut ThreeNamespace, params: Map| material(MaterialKind::Basic, &params),
        )
        .register_fn("MeshStandardMaterial", |_: &mut ThreeNamespace| {
            Material::new(MaterialKind::Standard)
        })
        .register_fn(
            "MeshStandardMaterial",
            |_: &mut ThreeNamespace, params: Map| material(MaterialKind::Standard, &params),
        )
        .register_fn(
            "Mesh",
            |_: &mut ThreeNamespace, geometry: Geometry, material: Material| mesh(geometry, material),
        )
        .register_fn("Mesh", |_: &mut ThreeNamespace, geometry: Geometry| {
            mesh(geometry, Material::new(MaterialKind::Basic))
        })
        .register_fn(
            "AmbientLight",
            |_: &mut ThreeNamespace, color: Dynamic| light(LightKind::Ambient, &color, 1.0),
        )
        .register_fn(
            "AmbientLight",
            |_: &mut ThreeNamespace, color: Dynamic, intensity: Dynamic| -> ScriptResult<Object3dHandle> {
                light(LightKind::Ambient, &color, number("AmbientLight", &intensity)?)
            },
        )
        .register_fn(
            "DirectionalLight",
            |_: &mut ThreeNamespace, color: Dynamic| light(LightKind::Directional, &color, 1.0),
        )
        .register_fn(
            "DirectionalLight",
            |_: &mut ThreeNamespace, color: Dynamic, intensity: Dynamic| -> ScriptResult<Object3dHandle> {
                light(LightKind::Directional, &color, number("DirectionalLight", &intensity)?)
            },
        )
        .register_fn(
            "PointLight",
            |_: &mut ThreeNamespace, color: Dynamic| light(LightKind::Point, &color, 1.0),
        )
        .register_fn(
            "PointLight",
            |_: &mut ThreeNamespace, color: Dynamic, intensity: Dynamic| -> ScriptResult<Object3dHandle> {
                light(LightKind::Point, &color, number("PointLight", &intensity)?)
            },
        )
        .register_fn("Color", |_: &mut ThreeNamespace, value: Dynamic| {
            color_value(&value)
        })
        .register_fn(
            "Color",
            |_: &mut ThreeNamespace, r: Dynamic, g: Dynamic, b: Dynamic| -> ScriptResult<Rgba> {
                let [r, g, b] = numbers("Color", [&r, &g, &b])?;
                Ok(Rgba::from_unit(r, g, b))
            },
        )
        .register_fn("Vector3", |_: &mut ThreeNamespace| DVec3::ZERO)
        .register_fn(
            "Vector3",
            |_: &mut ThreeNamespace, x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<DVec3> {
                let [x, y, z] = numbers("Vector3", [&x, &y, &z])?;
                Ok(DVec3::new(x, y, z))
            },
        );
}

fn register_values(engine: &mut Engine) {
    engine.register_type_with_name::<Geometry>("Geometry");

    engine
        .register_type_with_name::<Material>("Material")
        .register_get("color", |m: &mut Material| m.color)
        .register_set(
            "color",
            |m: &mut Material, value: Dynamic| -> ScriptResult<()> {
                m.color = color_value(&value)?;
                Ok(())
            },
        )
        .register_get("opacity", |m: &mut Material| -> FLOAT { m.opacity })
        .register_set(
            "opacity",
            |m: &mut Material, value: Dynamic| -> ScriptResult<()> {
                m.opacity = number("opacity", &value)?.clamp(0.0, 1.0);
                Ok(())
            },
        );

    engine
        .register_type_with_name::<DVec3>("Vector3")
        .register_get("x", |v: &mut DVec3| -> FLOAT { v.x })
        .register_set(
            "x",
            |v: &mut DVec3, value: Dynamic| -> ScriptResult<()> {
                v.x = number("x", &value)?;
                Ok(())
            },
        )
        .register_get("y", |v: &mut DVec3| -> FLOAT { v.y })
        .register_set(
            "y",
            |v: &mut DVec3, value: Dynamic| -> ScriptResult<()> {
                v.y = number("y", &value)?;
                Ok(())
            },
        )
        .register_get("z", |v: &mut DVec3| -> FLOAT { v.z })
        .register_set(
            "z",
            |v: &mut DVec3, value: Dynamic| -> ScriptResult<()> {
                v.z = number("z", &value)?;
                Ok(())
            },
        )
        .register_fn(
            "set",
            |v: &mut DVec3, x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<()> {
                let [x, y, z] = numbers("set", [&x, &y, &z])?;
                *v = DVec3::new(x, y, z);
                Ok(())
            },
        )
        .register_fn("setScalar", |v: &mut DVec3, s: Dynamic| -> ScriptResult<()> {
            *v = DVec3::splat(number("setScalar", &s)?);
            Ok(())
        })
        .register_fn("length", |v: &mut DVec3| -> FLOAT { v.length() })
        .register_fn("to_string", |v: &mut DVec3| format!("Vector3({}, {}, {})", v.x, v.y, v.z))
        .register_fn("to_debug", |v: &mut DVec3| format!("{v:?}"));

    engine
        .register_type_with_name::<Rgba>("Color")
        .register_get("r", |c: &mut Rgba| -> FLOAT { c.r as f64 / 255.0 })
        .register_set(
            "r",
            |c: &mut Rgba, value: Dynamic| -> ScriptResult<()> {
                c.r = Rgba::from_unit(number("r", &value)?, 0.0, 0.0).r;
                Ok(())
            },
        )
        .register_get("g", |c: &mut Rgba| -> FLOAT { c.g as f64 / 255.0 })
        .register_set(
            "g",
            |c: &mut Rgba, value: Dynamic| -> ScriptResult<()> {
                c.g = Rgba::from_unit(0.0, number("g", &value)?, 0.0).g;
                Ok(())
            },
        )
        .register_get("b", |c: &mut Rgba| -> FLOAT { c.b as f64 / 255.0 })
        .register_set(
            "b",
            |c: &mut Rgba, value: Dynamic| -> ScriptResult<()> {
                c.b = Rgba::from_unit(0.0, 0.0, number("b", &value)?).b;
                Ok(())
            },
        )
        .register_fn("getHex", |c: &mut Rgba| c.to_hex() as INT)
        .register_fn("setHex", |c: &mut Rgba, hex: INT| {
            *c = Rgba::from_hex(hex as u32);
        })
        .register_fn(
            "setRGB",
            |c: &mut Rgba, r: Dynamic, g: Dynamic, b: Dynamic| -> ScriptResult<()> {
                let [r, g, b] = numbers("setRGB", [&r, &g, &b])?;
                *c = Rgba::from_unit(r, g, b);
                Ok(())
            },
        )
        // Hue is a fraction of a turn, as in three.js.
        .register_fn(
            "setHSL",
            |c: &mut Rgba, h: Dynamic, s: Dynamic, l: Dynamic| -> ScriptResult<()> {
                let [h, s, l] = numbers("setHSL", [&h, &s, &l])?;
                let (r, g, b) = hsl_to_rgb(h * 360.0, s.clamp(0.0, 1.0), l.clamp(0.0, 1.0));
                *c = Rgba::from_unit(r, g, b);
                Ok(())
            },
        )
        .register_fn("to_string", |c: &mut Rgba| format!("#{:06x}", c.to_hex()))
        .register_fn("to_debug", |c: &mut Rgba| format!("{c:?}"));
}

fn register_objects(engine: &mut Engine) {
    engine
        .register_type_with_name::<Object3dHandle>("Object3D")
        .register_get("id", |o: &mut Object3dHandle| o.borrow().id as INT)
        .register_get("isMesh", |o: &mut Object3dHandle| o.borrow().is_mesh())
        .register_get_set(
            "name",
            |o: &mut Object3dHandle| -> ImmutableString { o.borrow().name.as_str().into() },
            |o: &mut Object3dHandle, name: ImmutableString| {
                o.borrow_mut().name = name.to_string();
            },
        )
        .register_get("position", |o: &mut Object3dHandle| o.borrow().position)
        .register_set(
            "position",
            |o: &mut Object3dHandle, v: DVec3| o.borrow_mut().position = v,
        )
        .register_get("rotation", |o: &mut Object3dHandle| o.borrow().rotation)
        .register_set(
            "rotation",
            |o: &mut Object3dHandle, v: DVec3| o.borrow_mut().rotation = v,
        )
        .register_get("scale", |o: &mut Object3dHandle| o.borrow().scale)
        .register_set(
            "scale",
            |o: &mut Object3dHandle, v: DVec3| o.borrow_mut().scale = v,
        )
        .register_get("visible", |o: &mut Object3dHandle| o.borrow().visible)
        .register_set(
            "visible",
            |o: &mut Object3dHandle, visible: bool| o.borrow_mut().visible = visible,
        )
        .register_get("color", |o: &mut Object3dHandle| o.borrow().color())
        .register_set(
            "color",
            |o: &mut Object3dHandle, value: Dynamic| -> ScriptResult<()> {
                let color = color_value(&value)?;
                o.borrow_mut().set_color(color);
                Ok(())
            },
        )
        .register_get(
            "material",
            |o: &mut Object3dHandle| -> Dynamic {
                match &o.borrow().kind {
                    ObjectKind::Mesh { material, .. } => Dynamic::from(material.clone()),
                    ObjectKind::Light(_) => Dynamic::UNIT,
                }
            },
        )
        .register_set(
            "material",
            |o: &mut Object3dHandle, value: Material| -> ScriptResult<()> {
                match &mut o.borrow_mut().kind {
                    ObjectKind::Mesh { material, .. } => {
                        *material = value;
                        Ok(())
                    }
                    ObjectKind::Light(_) => Err("lights have no material".into()),
                }
            },
        )
        .register_get_set(
            "intensity",
            |o: &mut Object3dHandle| -> Dynamic {
                match &o.borrow().kind {
                    ObjectKind::Light(light) => Dynamic::from_float(light.intensity),
                    ObjectKind::Mesh { .. } => Dynamic::UNIT,
                }
            },
            |o: &mut Object3dHandle, value: Dynamic| -> ScriptResult<()> {
                let intensity = number("intensity", &value)?;
                match &mut o.borrow_mut().kind {
                    ObjectKind::Light(light) => {
                        light.intensity = intensity;
                        Ok(())
                    }
                    ObjectKind::Mesh { .. } => Err("meshes have no intensity".into()),
                }
            },
        )
        .register_fn("rotateX", |o: &mut Object3dHandle, a: Dynamic| -> ScriptResult<()> {
            o.borrow_mut().rotation.x += number("rotateX", &a)?;
            Ok(())
        })
        .register_fn("rotateY", |o: &mut Object3dHandle, a: Dynamic| -> ScriptResult<()> {
            o.borrow_mut().rotation.y += number("rotateY", &a)?;
            Ok(())
        })
        .register_fn("rotateZ", |o: &mut Object3dHandle, a: Dynamic| -> ScriptResult<()> {
            o.borrow_mut().rotation.z += number("rotateZ", &a)?;
            Ok(())
        })
        .register_fn("==", |a: &mut Object3dHandle, b: Object3dHandle| a.ptr_eq(&b))
        .register_fn("!=", |a: &mut Object3dHandle, b: Object3dHandle| !a.ptr_eq(&b));
}

fn register_scene(engine: &mut Engine) {
    engine
        .register_type_with_name::<SceneHandle>("Scene")
        .register_fn("add", |s: &mut SceneHandle, object: Object3dHandle| {
            s.borrow_mut().add(object)
        })
        .register_fn("remove", |s: &mut SceneHandle, object: Object3dHandle| {
            s.borrow_mut().remove(&object)
        })
        .register_fn("contains", |s: &mut SceneHandle, object: Object3dHandle| {
            s.borrow().contains(&object)
        })
        .register_fn("clear", |s: &mut SceneHandle| s.borrow_mut().clear())
        .register_get("childCount", |s: &mut SceneHandle| s.borrow().len() as INT)
        .register_get("children", |s: &mut SceneHandle| -> Array {
            s.borrow()
                .children()
                .iter()
                .cloned()
                .map(Dynamic::from)
                .collect()
        })
        .register_get_set(
            "background",
            |s: &mut SceneHandle| -> Dynamic {
                s.borrow()
                    .background
                    .map(Dynamic::from)
                    .unwrap_or(Dynamic::UNIT)
            },
            |s: &mut SceneHandle, value: Dynamic| -> ScriptResult<()> {
                let background = if value.is_unit() {
                    None
                } else {
                    Some(color_value(&value)?)
                };
                s.borrow_mut().background = background;
                Ok(())
            },
        );
}

fn register_camera(engine: &mut Engine) {
    engine
        .register_type_with_name::<CameraHandle>("PerspectiveCamera")
        .register_get("position", |c: &mut CameraHandle| c.borrow().position)
        .register_set(
            "position",
            |c: &mut CameraHandle, v: DVec3| c.borrow_mut().position = v,
        )
        .register_get("fov", |c: &mut CameraHandle| -> FLOAT { c.borrow().fov })
        .register_set(
            "fov",
            |c: &mut CameraHandle, value: Dynamic| -> ScriptResult<()> {
                c.borrow_mut().fov = number("fov", &value)?;
                Ok(())
            },
        )
        .register_get("aspect", |c: &mut CameraHandle| -> FLOAT { c.borrow().aspect })
        .register_set(
            "aspect",
            |c: &mut CameraHandle, value: Dynamic| -> ScriptResult<()> {
                c.borrow_mut().aspect = number("aspect", &value)?;
                Ok(())
            },
        )
        .register_get("near", |c: &mut CameraHandle| -> FLOAT { c.borrow().near })
        .register_set(
            "near",
            |c: &mut CameraHandle, value: Dynamic| -> ScriptResult<()> {
                c.borrow_mut().near = number("near", &value)?;
                Ok(())
            },
        )
        .register_get("far", |c: &mut CameraHandle| -> FLOAT { c.borrow().far })
        .register_set(
            "far",
            |c: &mut CameraHandle, value: Dynamic| -> ScriptResult<()> {
                c.borrow_mut().far = number("far", &value)?;
                Ok(())
            },
        )
        .register_fn("lookAt", |c: &mut CameraHandle, target: DVec3| {
            c.borrow_mut().look_at(target)
        })
        .register_fn(
            "lookAt",
            |c: &mut CameraHandle, x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<()> {
                let [x, y, z] = numbers("lookAt", [&x, &y, &z])?;
                c.borrow_mut().look_at(DVec3::new(x, y, z));
                Ok(())
            },
        )
        .register_fn("updateProjectionMatrix", |c: &mut CameraHandle| {
            c.borrow_mut().update_projection_matrix()
        });
}

fn register_renderer(engine: &mut Engine) {
    engine
        .register_type_with_name::<RendererHandle>("WebGLRenderer")
        .register_get("width", |r: &mut RendererHandle| r.borrow().size().0 as INT)
        .register_get("height", |r: &mut RendererHandle| r.borrow().size().1 as INT)
        .register_get("pixelRatio", |r: &mut RendererHandle| -> FLOAT {
            r.borrow().pixel_ratio() as f64
        })
        .register_fn("setClearColor", |r: &mut RendererHandle, color: Dynamic| -> ScriptResult<()> {
            r.borrow_mut().set_clear_color(color_value(&color)?);
            Ok(())
        })
        .register_fn(
            "setClearColor",
            |r: &mut RendererHandle, color: Dynamic, alpha: Dynamic| -> ScriptResult<()> {
                let alpha = number("setClearColor", &alpha)?.clamp(0.0, 1.0);
                r.borrow_mut()
                    .set_clear_color(color_value(&color)?.with_alpha(alpha as f32));
                Ok(())
            },
        )
        .register_get("info", |r: &mut RendererHandle| -> Map {
            let info = r.borrow().info();
            let mut map = Map::new();
            map.insert("renderCalls".into(), Dynamic::from_int(info.render_calls as INT));
            map.insert("meshes".into(), Dynamic::from_int(info.meshes as INT));
            map.insert("lines".into(), Dynamic::from_int(info.lines as INT));
            map
        });
}

fn register_registry(engine: &mut Engine) {
    engine
        .register_type_with_name::<ObjectRegistry>("ObjectRegistry")
        .register_indexer_get(|r: &mut ObjectRegistry, key: ImmutableString| r.get(&key))
        .register_indexer_set(|r: &mut ObjectRegistry, key: ImmutableString, value: Dynamic| {
            r.set(&key, value)
        })
        .register_fn("contains", |r: &mut ObjectRegistry, key: ImmutableString| {
            r.contains(&key)
        })
        .register_fn("remove", |r: &mut ObjectRegistry, key: ImmutableString| {
            r.remove(&key).unwrap_or(Dynamic::UNIT)
        })
        .register_fn("clear", |r: &mut ObjectRegistry| r.clear())
        .register_fn("len", |r: &mut ObjectRegistry| r.len() as INT)
        .register_fn("keys", |r: &mut ObjectRegistry| -> Array {
            r.keys().into_iter().map(Dynamic::from).collect()
        });
}

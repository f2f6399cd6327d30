//! Persistent 3D scene graph, camera and object registry.
//!
//! These live in a [`SceneContext`] that outlives individual code revisions:
//! generated snippets guard their one-time setup with the registry, so the
//! scene they built on a previous revision is still there on the next one.

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use glam::{DMat4, DVec3};

use crate::canvas::Rgba;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Box {
        width: f64,
        height: f64,
        depth: f64,
    },
    Sphere {
        radius: f64,
        width_segments: u32,
        height_segments: u32,
    },
    Plane {
        width: f64,
        height: f64,
    },
}

impl Geometry {
    /// Vertices and edge index pairs in object space.
    pub fn wireframe(&self) -> (Vec<DVec3>, Vec<(usize, usize)>) {
        match *self {
            Geometry::Box {
                width,
                height,
                depth,
            } => {
                let (hx, hy, hz) = (width / 2.0, height / 2.0, depth / 2.0);
                let vertices = (0..8)
                    .map(|i| {
                        DVec3::new(
                            if i & 1 == 0 { -hx } else { hx },
                            if i & 2 == 0 { -hy } else { hy },
                            if i & 4 == 0 { -hz } else { hz },
                        )
                    })
                    .collect();
                let edges = vec![
                    (0, 1), (2, 3), (4, 5), (6, 7),
                    (0, 2), (1, 3), (4, 6), (5, 7),
                    (0, 4), (1, 5), (2, 6), (3, 7),
                ];
                (vertices, edges)
            }
            Geometry::Plane { width, height } => {
                let (hx, hy) = (width / 2.0, height / 2.0);
                let vertices = vec![
                    DVec3::new(-hx, -hy, 0.0),
                    DVec3::new(hx, -hy, 0.0),
                    DVec3::new(hx, hy, 0.0),
                    DVec3::new(-hx, hy, 0.0),
                ];
                (vertices, vec![(0, 1), (1, 2), (2, 3), (3, 0)])
            }
            Geometry::Sphere {
                radius,
                width_segments,
                height_segments,
            } => {
                let cols = width_segments.clamp(3, 64) as usize;
                let rows = height_segments.clamp(2, 64) as usize;
                let mut vertices = Vec::with_capacity((rows + 1) * cols);
                for row in 0..=rows {
                    let phi = std::f64::consts::PI * row as f64 / rows as f64;
                    for col in 0..cols {
                        let theta = std::f64::consts::TAU * col as f64 / cols as f64;
                        vertices.push(DVec3::new(
                            -radius * theta.cos() * phi.sin(),
                            radius * phi.cos(),
                            radius * theta.sin() * phi.sin(),
                        ));
                    }
                }
                let mut edges = Vec::new();
                for row in 0..=rows {
                    for col in 0..cols {
                        let here = row * cols + col;
                        edges.push((here, row * cols + (col + 1) % cols));
                        if row < rows {
                            edges.push((here, here + cols));
                        }
                    }
                }
                (vertices, edges)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Unlit.
    Basic,
    /// Lit by the scene's lights.
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub kind: MaterialKind,
    pub color: Rgba,
    pub emissive: Rgba,
    pub opacity: f64,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            color: Rgba::WHITE,
            emissive: Rgba::BLACK,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Rgba,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Mesh {
        geometry: Geometry,
        material: Material,
    },
    Light(Light),
}

#[derive(Debug, Clone)]
pub struct Object3d {
    pub id: u64,
    pub name: String,
    pub kind: ObjectKind,
    pub position: DVec3,
    /// Euler angles in radians, applied X then Y then Z.
    pub rotation: DVec3,
    pub scale: DVec3,
    pub visible: bool,
}

impl Object3d {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            name: String::new(),
            kind,
            position: DVec3::ZERO,
            rotation: DVec3::ZERO,
            scale: DVec3::ONE,
            visible: true,
        }
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, ObjectKind::Mesh { .. })
    }

    /// Mesh material colour or light colour.
    pub fn color(&self) -> Rgba {
        match &self.kind {
            ObjectKind::Mesh { material, .. } => material.color,
            ObjectKind::Light(light) => light.color,
        }
    }

    pub fn set_color(&mut self, color: Rgba) {
        match &mut self.kind {
            ObjectKind::Mesh { material, .. } => material.color = color,
            ObjectKind::Light(light) => light.color = color,
        }
    }

    pub fn model_matrix(&self) -> DMat4 {
        let rotation = glam::DQuat::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        DMat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// Shared handle to an [`Object3d`]. Equality is identity.
#[derive(Clone, Debug)]
pub struct Object3dHandle {
    inner: Rc<RefCell<Object3d>>,
}

impl Object3dHandle {
    pub fn new(object: Object3d) -> Self {
        Self {
            inner: Rc::new(RefCell::new(object)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, Object3d> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object3d> {
        self.inner.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Object3dHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    children: Vec<Object3dHandle>,
    pub background: Option<Rgba>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding an object that is already present is a no-op.
    pub fn add(&mut self, object: Object3dHandle) {
        if !self.contains(&object) {
            self.children.push(object);
        }
    }

    pub fn remove(&mut self, object: &Object3dHandle) -> bool {
        let before = self.children.len();
        self.children.retain(|child| !child.ptr_eq(object));
        before != self.children.len()
    }

    pub fn contains(&self, object: &Object3dHandle) -> bool {
        self.children.iter().any(|child| child.ptr_eq(object))
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn children(&self) -> &[Object3dHandle] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneHandle {
    inner: Rc<RefCell<Scene>>,
}

impl SceneHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrow(&self) -> Ref<'_, Scene> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Scene> {
        self.inner.borrow_mut()
    }
}

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    pub position: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    projection: DMat4,
}

impl PerspectiveCamera {
    pub fn new(fov: f64, aspect: f64, near: f64, far: f64) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: DVec3::ZERO,
            target: DVec3::NEG_Z,
            up: DVec3::Y,
            projection: DMat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    /// Recomputes the projection after `fov`, `aspect`, `near` or `far` change.
    pub fn update_projection_matrix(&mut self) {
        let aspect = if self.aspect.is_finite() && self.aspect > 0.0 {
            self.aspect
        } else {
            1.0
        };
        self.projection = DMat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far);
    }

    pub fn set_aspect(&mut self, aspect: f64) {
        self.aspect = aspect;
        self.update_projection_matrix();
    }

    pub fn look_at(&mut self, target: DVec3) {
        self.target = target;
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> DMat4 {
        let mut target = self.target;
        if (target - self.position).length_squared() < f64::EPSILON {
            target = self.position + DVec3::NEG_Z;
        }
        DMat4::look_at_rh(self.position, target, self.up)
    }
}

impl Default for PerspectiveCamera {
    /// 75° field of view, pulled back five units along +Z.
    fn default() -> Self {
        let mut camera = Self::new(75.0, 1.0, 0.1, 1000.0);
        camera.position = DVec3::new(0.0, 0.0, 5.0);
        camera.target = DVec3::ZERO;
        camera
    }
}

#[derive(Clone, Debug, Default)]
pub struct CameraHandle {
    inner: Rc<RefCell<PerspectiveCamera>>,
}

impl CameraHandle {
    pub fn new(camera: PerspectiveCamera) -> Self {
        Self {
            inner: Rc::new(RefCell::new(camera)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, PerspectiveCamera> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, PerspectiveCamera> {
        self.inner.borrow_mut()
    }
}

/// String-keyed store shared by every code revision, exposed to scripts as
/// `objects`. Snippets use it to remember what they already created.
#[derive(Clone, Debug, Default)]
pub struct ObjectRegistry {
    inner: Rc<RefCell<rhai::Map>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing keys read as `()`.
    pub fn get(&self, key: &str) -> rhai::Dynamic {
        self.inner
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(rhai::Dynamic::UNIT)
    }

    pub fn set(&self, key: &str, value: rhai::Dynamic) {
        self.inner.borrow_mut().insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<rhai::Dynamic> {
        self.inner.borrow_mut().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().keys().map(|k| k.to_string()).collect()
    }
}

/// The scene, camera and object registry shared across code revisions.
///
/// Created when the visualizer is first mounted and dropped only on a full
/// unmount. Mode switches and new code keep it; nothing here is reset on the
/// snippet's behalf.
#[derive(Clone, Debug, Default)]
pub struct SceneContext {
    pub scene: SceneHandle,
    pub camera: CameraHandle,
    pub objects: ObjectRegistry,
}

impl SceneContext {
    pub fn new() -> Self {
        Self::default()
    }
}

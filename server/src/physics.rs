//! Rigid-body physics boundary.
//!
//! The room logic only talks to [`PhysicsEngine`]. [`SimpleEngine`] is the
//! built-in implementation: semi-implicit Euler integration, an AABB broad
//! phase and a separating-axis narrow phase over the convex parts of each
//! body. World coordinates grow to the right and downwards.

use crate::error::PhysicsError;
use shared::decomp::{
    make_ccw, quick_decomp, remove_collinear_points, remove_duplicate_points, DecompError,
    DecompOptions, DEFAULT_TOLERANCE,
};
use shared::geometry::{polygon_area, polygon_centroid, Polygon, Vector2};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

pub type BodyId = u32;

pub const DEFAULT_DENSITY: f32 = 0.001;
/// Angular tolerance used when dropping collinear outline points.
pub const COLLINEAR_TOLERANCE: f32 = 0.01;
pub const DUPLICATE_TOLERANCE: f32 = 0.01;
/// Decomposed parts smaller than this are discarded.
pub const MIN_PART_AREA: f32 = 1.0;
/// Penetration left in place after resolution so resting contacts persist.
const CONTACT_SLOP: f32 = 0.05;

/// Everything needed to create a body. Parts are convex and relative to
/// `position`.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub position: Vector2,
    pub angle: f32,
    pub velocity: Vector2,
    pub parts: Vec<Polygon>,
    pub is_static: bool,
    pub density: f32,
}

impl BodyDesc {
    /// Axis-aligned rectangle centred on `(x, y)`.
    pub fn rectangle(x: f32, y: f32, width: f32, height: f32, is_static: bool) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self {
            position: Vector2::new(x, y),
            angle: 0.0,
            velocity: Vector2::ZERO,
            parts: vec![vec![
                Vector2::new(-hw, -hh),
                Vector2::new(hw, -hh),
                Vector2::new(hw, hh),
                Vector2::new(-hw, hh),
            ]],
            is_static,
            density: DEFAULT_DENSITY,
        }
    }

    /// Dynamic body from an arbitrary simple outline, centred on `(x, y)`.
    ///
    /// The outline is normalised, cleaned of collinear and duplicate
    /// points, decomposed into convex parts, and re-centred on its
    /// area-weighted centroid.
    pub fn from_outline(x: f32, y: f32, outline: &[Vector2]) -> Result<Self, PhysicsError> {
        let mut points = outline.to_vec();
        make_ccw(&mut points, DEFAULT_TOLERANCE);
        remove_collinear_points(&mut points, COLLINEAR_TOLERANCE);
        remove_duplicate_points(&mut points, DUPLICATE_TOLERANCE);

        let decomposition = quick_decomp(&points, DecompOptions::default())?;
        let parts: Vec<Polygon> = decomposition
            .pieces
            .into_iter()
            .filter(|p| polygon_area(p).abs() >= MIN_PART_AREA)
            .collect();

        let mut total_area = 0.0;
        let mut weighted = Vector2::ZERO;
        for part in &parts {
            if let Some(c) = polygon_centroid(part) {
                let area = polygon_area(part).abs();
                weighted += c * area;
                total_area += area;
            }
        }
        if total_area <= 0.0 {
            return Err(DecompError::Degenerate.into());
        }
        let centre = weighted * (1.0 / total_area);

        let parts = parts
            .into_iter()
            .map(|part| part.into_iter().map(|p| p - centre).collect())
            .collect();

        Ok(Self {
            position: Vector2::new(x, y),
            angle: 0.0,
            velocity: Vector2::ZERO,
            parts,
            is_static: false,
            density: DEFAULT_DENSITY,
        })
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vector2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn area(&self) -> f32 {
        self.parts.iter().map(|p| polygon_area(p).abs()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub position: Vector2,
    pub angle: f32,
    pub velocity: Vector2,
    pub mass: f32,
    pub is_static: bool,
}

/// Two bodies that started touching during a step. Stored low id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair {
    pub a: BodyId,
    pub b: BodyId,
}

impl CollisionPair {
    pub fn new(a: BodyId, b: BodyId) -> Self {
        Self {
            a: a.min(b),
            b: a.max(b),
        }
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.a == id || self.b == id
    }
}

/// The operations the room needs from a rigid-body solver.
pub trait PhysicsEngine: Send {
    fn set_gravity(&mut self, gravity: Vector2);

    /// Ids are allocated by the engine and never reused.
    fn add_body(&mut self, desc: BodyDesc) -> BodyId;

    fn remove_body(&mut self, id: BodyId) -> bool;

    fn body(&self, id: BodyId) -> Option<BodySnapshot>;

    /// All live bodies in ascending id order.
    fn bodies(&self) -> Vec<BodySnapshot>;

    fn translate(&mut self, id: BodyId, delta: Vector2) -> bool;

    /// Rotates about the body position.
    fn rotate(&mut self, id: BodyId, angle: f32) -> bool;

    fn set_velocity(&mut self, id: BodyId, velocity: Vector2) -> bool;

    /// Accumulates a force for the next step only.
    fn apply_force(&mut self, id: BodyId, force: Vector2) -> bool;

    /// Advances the world once and returns the pairs that started
    /// touching during this step.
    fn step(&mut self, dt: Duration) -> Result<Vec<CollisionPair>, PhysicsError>;

    fn clear(&mut self);
}

#[derive(Debug, Clone)]
struct Body {
    position: Vector2,
    angle: f32,
    velocity: Vector2,
    force: Vector2,
    mass: f32,
    inv_mass: f32,
    is_static: bool,
    parts: Vec<Polygon>,
}

impl Body {
    fn world_parts(&self) -> Vec<Polygon> {
        self.parts
            .iter()
            .map(|part| {
                part.iter()
                    .map(|p| p.rotate(self.angle) + self.position)
                    .collect()
            })
            .collect()
    }

    fn snapshot(&self, id: BodyId) -> BodySnapshot {
        BodySnapshot {
            id,
            position: self.position,
            angle: self.angle,
            velocity: self.velocity,
            mass: self.mass,
            is_static: self.is_static,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Vector2,
    max: Vector2,
}

impl Aabb {
    fn around(parts: &[Polygon]) -> Self {
        let mut min = Vector2::new(f32::MAX, f32::MAX);
        let mut max = Vector2::new(f32::MIN, f32::MIN);
        for p in parts.iter().flatten() {
            min = Vector2::new(min.x.min(p.x), min.y.min(p.y));
            max = Vector2::new(max.x.max(p.x), max.y.max(p.y));
        }
        Self { min, max }
    }

    fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    a: BodyId,
    b: BodyId,
    /// Unit vector pointing from `a` towards `b`.
    normal: Vector2,
    depth: f32,
}

struct Collider {
    id: BodyId,
    is_static: bool,
    bounds: Aabb,
    parts: Vec<Polygon>,
}

#[derive(Debug, Default)]
pub struct SimpleEngine {
    gravity: Vector2,
    bodies: BTreeMap<BodyId, Body>,
    next_id: BodyId,
    contacts: HashSet<CollisionPair>,
}

impl SimpleEngine {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn integrate(&mut self, dt: f32) -> Result<(), PhysicsError> {
        for (&id, body) in self.bodies.iter_mut() {
            if body.is_static {
                continue;
            }
            let acceleration = self.gravity + body.force * body.inv_mass;
            body.velocity += acceleration * dt;
            body.position += body.velocity * dt;
            body.force = Vector2::ZERO;

            if !body.position.is_finite() || !body.velocity.is_finite() || !body.angle.is_finite()
            {
                return Err(PhysicsError::NonFinite { id });
            }
        }
        Ok(())
    }

    fn find_contacts(&self) -> Vec<Contact> {
        let colliders: Vec<Collider> = self
            .bodies
            .iter()
            .map(|(&id, body)| {
                let parts = body.world_parts();
                Collider {
                    id,
                    is_static: body.is_static,
                    bounds: Aabb::around(&parts),
                    parts,
                }
            })
            .collect();

        let mut contacts = Vec::new();
        for (i, first) in colliders.iter().enumerate() {
            for second in &colliders[i + 1..] {
                if first.is_static && second.is_static {
                    continue;
                }
                if !first.bounds.overlaps(&second.bounds) {
                    continue;
                }

                // deepest overlap across every part pair
                let mut deepest: Option<(Vector2, f32)> = None;
                for pa in &first.parts {
                    for pb in &second.parts {
                        if let Some((normal, depth)) = sat_overlap(pa, pb) {
                            if deepest.map_or(true, |(_, d)| depth > d) {
                                deepest = Some((normal, depth));
                            }
                        }
                    }
                }

                if let Some((normal, depth)) = deepest {
                    contacts.push(Contact {
                        a: first.id,
                        b: second.id,
                        normal,
                        depth,
                    });
                }
            }
        }
        contacts
    }

    fn resolve(&mut self, contact: &Contact) {
        let (Some(a), Some(b)) = (
            self.bodies.get(&contact.a).cloned(),
            self.bodies.get(&contact.b).cloned(),
        ) else {
            return;
        };

        let n = contact.normal;
        let correction = (contact.depth - CONTACT_SLOP).max(0.0);
        let (share_a, share_b) = match (a.is_static, b.is_static) {
            (true, true) => return,
            (true, false) => (0.0, 1.0),
            (false, true) => (1.0, 0.0),
            (false, false) => (0.5, 0.5),
        };

        // relative velocity along the normal; negative means approaching
        let closing = (b.velocity - a.velocity).dot(n);

        if let Some(body) = self.bodies.get_mut(&contact.a) {
            body.position = body.position - n * (correction * share_a);
            if closing < 0.0 && share_a > 0.0 {
                body.velocity = body.velocity + n * (closing * share_a);
            }
        }
        if let Some(body) = self.bodies.get_mut(&contact.b) {
            body.position += n * (correction * share_b);
            if closing < 0.0 && share_b > 0.0 {
                body.velocity = body.velocity - n * (closing * share_b);
            }
        }
    }
}

/// Separating-axis test between two convex polygons. Returns the minimum
/// translation axis (pointing from `a` to `b`) and its depth.
fn sat_overlap(a: &[Vector2], b: &[Vector2]) -> Option<(Vector2, f32)> {
    let mut best_axis = Vector2::ZERO;
    let mut best_depth = f32::MAX;

    for poly in [a, b] {
        let n = poly.len();
        for i in 0..n {
            let edge = poly[(i + 1) % n] - poly[i];
            let normal = edge.perp();
            if normal.magnitude() < f32::EPSILON {
                continue;
            }
            let axis = normal.normalize();
            let (min_a, max_a) = project(a, axis);
            let (min_b, max_b) = project(b, axis);
            let depth = max_a.min(max_b) - min_a.max(min_b);
            if depth <= 0.0 {
                return None;
            }
            if depth < best_depth {
                best_depth = depth;
                best_axis = axis;
            }
        }
    }

    let direction = mean(b) - mean(a);
    if direction.dot(best_axis) < 0.0 {
        best_axis = -best_axis;
    }
    Some((best_axis, best_depth))
}

fn project(poly: &[Vector2], axis: Vector2) -> (f32, f32) {
    poly.iter().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

fn mean(poly: &[Vector2]) -> Vector2 {
    let sum = poly.iter().fold(Vector2::ZERO, |acc, p| acc + *p);
    sum * (1.0 / poly.len().max(1) as f32)
}

impl PhysicsEngine for SimpleEngine {
    fn set_gravity(&mut self, gravity: Vector2) {
        self.gravity = gravity;
    }

    fn add_body(&mut self, desc: BodyDesc) -> BodyId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;

        let mass = desc.density * desc.area();
        let inv_mass = if desc.is_static || mass <= 0.0 {
            0.0
        } else {
            1.0 / mass
        };
        self.bodies.insert(
            id,
            Body {
                position: desc.position,
                angle: desc.angle,
                velocity: if desc.is_static {
                    Vector2::ZERO
                } else {
                    desc.velocity
                },
                force: Vector2::ZERO,
                mass,
                inv_mass,
                is_static: desc.is_static,
                parts: desc.parts,
            },
        );
        id
    }

    fn remove_body(&mut self, id: BodyId) -> bool {
        self.contacts.retain(|pair| !pair.contains(id));
        self.bodies.remove(&id).is_some()
    }

    fn body(&self, id: BodyId) -> Option<BodySnapshot> {
        self.bodies.get(&id).map(|b| b.snapshot(id))
    }

    fn bodies(&self) -> Vec<BodySnapshot> {
        self.bodies.iter().map(|(&id, b)| b.snapshot(id)).collect()
    }

    fn translate(&mut self, id: BodyId, delta: Vector2) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.position += delta;
                true
            }
            None => false,
        }
    }

    fn rotate(&mut self, id: BodyId, angle: f32) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.angle += angle;
                true
            }
            None => false,
        }
    }

    fn set_velocity(&mut self, id: BodyId, velocity: Vector2) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) if !body.is_static => {
                body.velocity = velocity;
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    fn apply_force(&mut self, id: BodyId, force: Vector2) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.force += force;
                true
            }
            None => false,
        }
    }

    fn step(&mut self, dt: Duration) -> Result<Vec<CollisionPair>, PhysicsError> {
        self.integrate(dt.as_secs_f32())?;

        let contacts = self.find_contacts();
        let touching: HashSet<CollisionPair> = contacts
            .iter()
            .map(|c| CollisionPair::new(c.a, c.b))
            .collect();

        let mut started: Vec<CollisionPair> = touching
            .iter()
            .filter(|pair| !self.contacts.contains(pair))
            .copied()
            .collect();
        started.sort_by_key(|pair| (pair.a, pair.b));

        for contact in &contacts {
            self.resolve(contact);
        }
        self.contacts = touching;

        Ok(started)
    }

    fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
    }
}

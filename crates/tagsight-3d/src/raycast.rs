use glam::Vec3;

/// A half line in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing `direction`.
    ///
    /// Returns `None` when the direction has no length.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Host capability answering where a world ray first meets a real surface.
pub trait EnvironmentRaycaster {
    /// First hit point of `ray` with the environment, if any.
    fn raycast(&self, ray: &Ray) -> Option<Vec3>;
}

impl<T: EnvironmentRaycaster + ?Sized> EnvironmentRaycaster for &T {
    fn raycast(&self, ray: &Ray) -> Option<Vec3> {
        (**self).raycast(ray)
    }
}

/// An environment without any surface. Every query misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSurface;

impl EnvironmentRaycaster for NoSurface {
    fn raycast(&self, _ray: &Ray) -> Option<Vec3> {
        None
    }
}

/// An infinite plane, e.g. a wall or a table top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneRaycaster {
    /// Any point on the plane.
    pub point: Vec3,
    /// Plane normal, not necessarily unit.
    pub normal: Vec3,
    /// Hits farther than this are ignored.
    pub max_distance: f32,
}

impl PlaneRaycaster {
    /// Plane through `point` with `normal`, unlimited range.
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal,
            max_distance: f32::INFINITY,
        }
    }
}

impl EnvironmentRaycaster for PlaneRaycaster {
    fn raycast(&self, ray: &Ray) -> Option<Vec3> {
        let denom = self.normal.dot(ray.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = self.normal.dot(self.point - ray.origin) / denom;
        if t < 0.0 || t > self.max_distance {
            return None;
        }
        Some(ray.at(t))
    }
}

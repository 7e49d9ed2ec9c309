//! Model and normal matrices for emitted geometry.

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4};

/// The model transform applied to emitted vertices.
///
/// Positions go through the full 4x4 model matrix. Normals go through the normal matrix,
/// the inverse-transpose of the model's upper 3x3, and are renormalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformState {
    model: Matrix4<f32>,
    normal: Matrix3<f32>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformState {
    /// No transform.
    pub fn identity() -> Self {
        Self {
            model: Matrix4::identity(),
            normal: Matrix3::identity(),
        }
    }

    /// Sets the model matrix and derives the normal matrix from it.
    ///
    /// A singular upper 3x3 has no inverse; its normals are transformed by the 3x3 itself.
    pub fn set(&mut self, model: Matrix4<f32>) {
        let linear = Matrix3::from_cols(model.x.truncate(), model.y.truncate(), model.z.truncate());
        self.model = model;
        self.normal = linear
            .invert()
            .map_or(linear, |inverse| inverse.transpose());
    }

    /// Sets both matrices explicitly.
    pub fn set_with_normal(&mut self, model: Matrix4<f32>, normal: Matrix3<f32>) {
        self.model = model;
        self.normal = normal;
    }

    /// The model matrix.
    pub fn model(&self) -> Matrix4<f32> {
        self.model
    }

    /// The matrix normals go through.
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        self.normal
    }

    /// Applies the model matrix to a point.
    pub fn transform_position(&self, position: [f32; 3]) -> [f32; 3] {
        let p = self.model * Vector4::new(position[0], position[1], position[2], 1.0);
        [p.x, p.y, p.z]
    }

    /// Transforms and renormalizes `normal`. A zero normal stays zero.
    pub fn transform_normal(&self, normal: [f32; 3]) -> [f32; 3] {
        let n = self.normal * Vector3::from(normal);
        if n.magnitude2() <= f32::EPSILON {
            return [0.0, 0.0, 0.0];
        }
        n.normalize().into()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Vector3};

    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn identity_is_a_no_op() {
        let transform = TransformState::identity();
        assert_eq!(transform.transform_position([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
        assert!(close(transform.transform_normal([0.0, 2.0, 0.0]), [0.0, 1.0, 0.0]));
    }

    #[test]
    fn translation_moves_positions_not_normals() {
        let mut transform = TransformState::identity();
        transform.set(Matrix4::from_translation(Vector3::new(10.0, 0.0, -5.0)));
        assert_eq!(transform.transform_position([1.0, 1.0, 1.0]), [11.0, 1.0, -4.0]);
        assert!(close(transform.transform_normal([1.0, 0.0, 0.0]), [1.0, 0.0, 0.0]));
    }

    #[test]
    fn non_uniform_scale_keeps_normals_perpendicular() {
        let mut transform = TransformState::identity();
        transform.set(Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0));
        // The plane x + y = 0 has normal (1, 1, 0)/sqrt(2); after scaling x by 2 its normal
        // becomes (1, 2, 0)/sqrt(5).
        let n = transform.transform_normal([1.0, 1.0, 0.0]);
        let expected = Vector3::new(1.0f32, 2.0, 0.0).normalize();
        assert!(close(n, expected.into()));
    }

    #[test]
    fn rotation_rotates_normals() {
        let mut transform = TransformState::identity();
        transform.set(Matrix4::from_angle_z(Deg(90.0)));
        assert!(close(transform.transform_normal([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]));
    }

    #[test]
    fn singular_model_does_not_panic() {
        let mut transform = TransformState::identity();
        transform.set(Matrix4::from_nonuniform_scale(1.0, 0.0, 1.0));
        assert!(close(transform.transform_normal([0.0, 1.0, 0.0]), [0.0, 0.0, 0.0]));
    }
}

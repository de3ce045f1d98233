//! Bone hierarchies that joint chains are built from and posed onto.

use glam::{Mat4, Quat, Vec3};

/// The scene-graph operations a [`JointChain`](super::JointChain) needs.
///
/// Hosts with their own scene graph implement this over their node handles;
/// [`Armature`] is a self-contained implementation.
pub trait BoneHierarchy {
    type Bone: Copy + Eq + std::fmt::Debug;

    fn first_child(&self, bone: Self::Bone) -> Option<Self::Bone>;

    fn child_count(&self, bone: Self::Bone) -> usize;

    /// Translation relative to the parent bone.
    fn local_position(&self, bone: Self::Bone) -> Vec3;

    fn world_position(&self, bone: Self::Bone) -> Vec3;

    fn set_local_rotation(&mut self, bone: Self::Bone, rotation: Quat);
}

/// Handle to a bone in an [`Armature`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoneId(pub(crate) usize);

/// A bone's transform relative to its parent.
///
/// Defaults to no translation, no rotation and unit scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transform that only translates.
    ///
    /// ```
    /// use glimmer::{BoneTransform, Vec3};
    ///
    /// let transform = BoneTransform::from_position(Vec3::new(0.0, 1.0, 0.0));
    /// assert_eq!(transform.position, Vec3::Y);
    /// ```
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// One bone of an [`Armature`].
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub local: BoneTransform,
    parent: Option<BoneId>,
    children: Vec<BoneId>,
}

impl Bone {
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn children(&self) -> &[BoneId] {
        &self.children
    }
}

/// An arena of bones linked parent to child.
///
/// Handles from another armature read as missing bones: no children and a
/// zero position.
#[derive(Clone, Debug, Default)]
pub struct Armature {
    bones: Vec<Bone>,
}

impl Armature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bone without a parent.
    pub fn add_root(&mut self, name: impl Into<String>, local: BoneTransform) -> BoneId {
        self.push(name.into(), local, None)
    }

    /// Adds a bone under `parent`, after its existing children.
    ///
    /// Returns `None` if `parent` is not a bone of this armature.
    pub fn add_child(
        &mut self,
        parent: BoneId,
        name: impl Into<String>,
        local: BoneTransform,
    ) -> Option<BoneId> {
        self.bones.get(parent.0)?;
        let id = self.push(name.into(), local, Some(parent));
        self.bones[parent.0].children.push(id);
        Some(id)
    }

    /// Builds a single-child chain: a root at the origin followed by one bone
    /// per offset.
    pub fn linear(offsets: &[Vec3]) -> (Self, BoneId) {
        let mut armature = Self::new();
        let root = armature.add_root("root", BoneTransform::new());
        let mut parent = root;
        for (i, offset) in offsets.iter().enumerate() {
            let id = armature.push(format!("bone{i}"), BoneTransform::from_position(*offset), Some(parent));
            armature.bones[parent.0].children.push(id);
            parent = id;
        }
        (armature, root)
    }

    pub fn bone(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    pub fn bone_mut(&mut self, id: BoneId) -> Option<&mut Bone> {
        self.bones.get_mut(id.0)
    }

    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|bone| bone.name == name).map(BoneId)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// The bone's transform in armature space.
    pub fn world_matrix(&self, id: BoneId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.bones.get(id.0).map(|_| id);
        while let Some(bone) = current.and_then(|id| self.bones.get(id.0)) {
            matrix = bone.local.matrix() * matrix;
            current = bone.parent;
        }
        matrix
    }

    fn push(&mut self, name: String, local: BoneTransform, parent: Option<BoneId>) -> BoneId {
        let id = BoneId(self.bones.len());
        self.bones.push(Bone {
            name,
            local,
            parent,
            children: Vec::new(),
        });
        id
    }
}

impl BoneHierarchy for Armature {
    type Bone = BoneId;

    fn first_child(&self, bone: BoneId) -> Option<BoneId> {
        self.bone(bone)?.children.first().copied()
    }

    fn child_count(&self, bone: BoneId) -> usize {
        self.bone(bone).map_or(0, |bone| bone.children.len())
    }

    fn local_position(&self, bone: BoneId) -> Vec3 {
        self.bone(bone).map_or(Vec3::ZERO, |bone| bone.local.position)
    }

    fn world_position(&self, bone: BoneId) -> Vec3 {
        if self.bone(bone).is_none() {
            return Vec3::ZERO;
        }
        self.world_matrix(bone).transform_point3(Vec3::ZERO)
    }

    fn set_local_rotation(&mut self, bone: BoneId, rotation: Quat) {
        if let Some(bone) = self.bone_mut(bone) {
            bone.local.rotation = rotation;
        }
    }
}

//! 渲染协作接口
//!
//! 渲染器从不直接读取粒子内部状态：每个可见容器得到一个渲染对象句柄和一个
//! [`VertexCreator`]，先剔除再写顶点。调用前发射器的更新任务必须已同步，
//! 这一点由 [`crate::particles::ParticleManager::render`] 保证。

use crate::effect::{EffectId, EnvFlags};
use crate::math::{Aabb, Camera};
use crate::particles::{Particle, ParticleContainer, ParticleEmitter, ShapeTag};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// 单个粒子的顶点记录
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    /// 世界位置
    pub position: [f32; 3],
    /// 世界尺寸
    pub size: f32,
    /// 速度（拉伸和朝向用）
    pub velocity: [f32; 3],
    pub alpha: f32,
    /// 旋转四元数 (x, y, z, w)
    pub rotation: [f32; 4],
    pub stretch: f32,
    /// 0..=1 的相对年龄
    pub relative_age: f32,
    /// 连接序列号
    pub seq: u32,
    /// 0 精灵，1 贴花，2 几何体（整体），3 + n 几何体第 n 个部件
    pub shape: u32,
}

impl ParticleVertex {
    pub fn from_particle(p: &Particle) -> Self {
        Self {
            position: p.position().to_array(),
            size: p.world_size(),
            velocity: p.velocity().to_array(),
            alpha: p.render_alpha(),
            rotation: p.moving.loc.rotation.to_array(),
            stretch: p.attrs.stretch,
            relative_age: p.time.relative_age(),
            seq: p.attrs.seq,
            shape: shape_code(p.attrs.shape),
        }
    }
}

fn shape_code(shape: ShapeTag) -> u32 {
    match shape {
        ShapeTag::Sprite => 0,
        ShapeTag::Decal => 1,
        ShapeTag::Geometry { piece: None } => 2,
        ShapeTag::Geometry { piece: Some(n) } => 3 + n,
    }
}

/// 渲染对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderObjectHandle {
    pub emitter: u64,
    pub effect: EffectId,
}

/// 顶点生成回调
pub trait VertexCreator {
    /// 整体是否可见
    fn cull(&self, camera: &Camera) -> bool;

    /// 写出可见粒子的顶点，返回写出数量
    fn write_vertices(&self, camera: &Camera, out: &mut Vec<ParticleVertex>) -> usize;
}

/// 渲染器
pub trait ParticleRenderer {
    fn render_container(&mut self, handle: RenderObjectHandle, creator: &dyn VertexCreator);
}

/// 单个容器的顶点生成
pub struct ContainerVertexCreator<'a> {
    container: &'a ParticleContainer,
}

impl<'a> ContainerVertexCreator<'a> {
    pub fn new(container: &'a ParticleContainer) -> Self {
        Self { container }
    }

    fn particle_visible(p: &Particle, camera: &Camera) -> bool {
        let mut bb = Aabb::RESET;
        p.add_bounds(&mut bb);
        camera.is_visible(&bb)
    }

    /// 可见与被剔除的粒子数
    pub fn classify(&self, camera: &Camera) -> (usize, usize) {
        self.container
            .visible_particles()
            .fold((0, 0), |(inside, clipped), p| {
                if Self::particle_visible(p, camera) {
                    (inside + 1, clipped)
                } else {
                    (inside, clipped + 1)
                }
            })
    }
}

impl VertexCreator for ContainerVertexCreator<'_> {
    fn cull(&self, camera: &Camera) -> bool {
        let bb = self.container.world_bounds();
        !bb.is_reset() && camera.is_visible(bb)
    }

    fn write_vertices(&self, camera: &Camera, out: &mut Vec<ParticleVertex>) -> usize {
        let before = out.len();
        out.extend(
            self.container
                .visible_particles()
                .filter(|p| p.render_alpha() > 0.0 && Self::particle_visible(p, camera))
                .map(ParticleVertex::from_particle),
        );
        out.len() - before
    }
}

/// 剔除并提交一个发射器；不可见时返回 `false`
///
/// 可见性同时记为“已渲染”，下一帧管理器据此为它提交后台更新任务。
pub fn render_emitter(emitter: &mut ParticleEmitter, camera: &Camera, renderer: &mut dyn ParticleRenderer) -> bool {
    let bb = *emitter.world_bounds();
    let camera_bound = emitter.env_flags().contains(EnvFlags::REN_BIND_CAMERA);
    if !camera_bound && (bb.is_reset() || !camera.is_visible(&bb)) {
        return false;
    }
    emitter.mark_rendered();

    let id = emitter.id();
    let mut rendered = 0;
    let mut clipped = 0;
    for container in emitter.containers() {
        if !container.is_enabled() || !container.env_flags().renders() || container.particle_count() == 0 {
            continue;
        }
        let creator = ContainerVertexCreator::new(container);
        if !creator.cull(camera) {
            clipped += container.visible_particles().count();
            continue;
        }
        let (inside, outside) = creator.classify(camera);
        rendered += inside;
        clipped += outside;
        renderer.render_container(
            RenderObjectHandle {
                emitter: id,
                effect: container.effect(),
            },
            &creator,
        );
    }
    emitter.add_render_counts(rendered, clipped);
    true
}

/// 收集顶点的内存渲染器
#[derive(Debug, Default)]
pub struct VertexCollector {
    camera: Camera,
    pub batches: Vec<(RenderObjectHandle, Vec<ParticleVertex>)>,
}

impl VertexCollector {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            batches: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.batches.iter().map(|(_, v)| v.len()).sum()
    }

    /// 全部顶点的包围盒
    pub fn bounds(&self) -> Aabb {
        let mut bb = Aabb::RESET;
        for v in self.batches.iter().flat_map(|(_, v)| v.iter()) {
            bb.add_point(Vec3::from_array(v.position));
        }
        bb
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    /// 原始字节，供上传到 GPU 缓冲
    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        self.batches.get(index).map(|(_, v)| bytemuck::cast_slice(v.as_slice()))
    }
}

impl ParticleRenderer for VertexCollector {
    fn render_container(&mut self, handle: RenderObjectHandle, creator: &dyn VertexCreator) {
        let mut vertices = Vec::new();
        if creator.cull(&self.camera) {
            creator.write_vertices(&self.camera, &mut vertices);
        }
        self.batches.push((handle, vertices));
    }
}

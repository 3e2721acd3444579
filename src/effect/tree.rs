//! 效果树
//!
//! 节点按插入顺序存放在数组里，子节点总在父节点之后，因此下标顺序就是
//! “父先于子”的更新顺序。参数变化时立即校验并重新计算环境标志。

use super::flags::EnvFlags;
use super::params::{EffectParams, EnvFlagOptions, SpawnIndirection};
use crate::core::error::ParamError;
use crate::impl_default;

/// 树内节点句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub(crate) usize);

impl EffectId {
    pub const ROOT: EffectId = EffectId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct EffectNode {
    name: String,
    parent: Option<EffectId>,
    children: Vec<EffectId>,
    params: EffectParams,
    env_flags: EnvFlags,
    /// 校验失败时记录原因，节点按禁用处理
    invalid: Option<ParamError>,
}

/// 最长效果寿命的查询选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxLifeOpts {
    /// 发射器寿命上限；`<= 0` 表示只计粒子寿命
    pub emitter_max_life: f32,
    /// 是否加上粒子寿命
    pub particle_life: bool,
    pub all_children: bool,
    pub indirect_children: bool,
}

impl_default!(MaxLifeOpts {
    emitter_max_life: f32::INFINITY,
    particle_life: true,
    all_children: false,
    indirect_children: false,
});

/// 效果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectCounts {
    pub loaded: usize,
    pub enabled: usize,
    pub active: usize,
    pub invalid: usize,
}

/// 一棵效果树：根节点加任意层子效果
#[derive(Debug, Clone)]
pub struct EffectTree {
    nodes: Vec<EffectNode>,
    options: EnvFlagOptions,
}

impl EffectTree {
    /// 以根节点创建效果树
    pub fn new(name: impl Into<String>, params: EffectParams) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            options: EnvFlagOptions::default(),
        };
        tree.push_node(name.into(), None, params);
        tree
    }

    fn push_node(&mut self, name: String, parent: Option<EffectId>, params: EffectParams) -> EffectId {
        let id = EffectId(self.nodes.len());
        self.nodes.push(EffectNode {
            name,
            parent,
            children: Vec::new(),
            params: EffectParams::default(),
            env_flags: EnvFlags::empty(),
            invalid: None,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        self.set_params(id, params);
        id
    }

    /// 添加子效果
    pub fn add_child(&mut self, parent: EffectId, name: impl Into<String>, params: EffectParams) -> EffectId {
        self.push_node(name.into(), Some(parent), params)
    }

    /// 以父效果参数为起点添加子效果，`edit` 只需覆盖与父效果不同的字段
    pub fn add_child_inherited(
        &mut self,
        parent: EffectId,
        name: impl Into<String>,
        edit: impl FnOnce(&mut EffectParams),
    ) -> EffectId {
        let mut params = self.nodes[parent.0].params.clone();
        params.spawn_indirection = SpawnIndirection::None;
        edit(&mut params);
        self.add_child(parent, name, params)
    }

    /// 替换参数，重新校验并计算环境标志
    pub fn set_params(&mut self, id: EffectId, params: EffectParams) {
        let full_name = self.full_name(id);
        let mut result = params.validate(&full_name);
        if result.is_ok()
            && params.spawn_indirection != SpawnIndirection::None
            && self.nodes[id.0].parent.is_none()
        {
            result = Err(ParamError::IndirectWithoutParent {
                effect: full_name.clone(),
            });
        }

        let node = &mut self.nodes[id.0];
        match result {
            Ok(()) => {
                node.env_flags = params.compute_env_flags(&self.options);
                node.invalid = None;
            }
            Err(e) => {
                tracing::warn!(target: "particles", "Effect '{}' disabled: {}", full_name, e);
                node.env_flags = EnvFlags::empty();
                node.invalid = Some(e);
            }
        }
        node.params = params;
    }

    /// 更换环境标志选项并重新计算所有节点
    pub fn set_env_flag_options(&mut self, options: EnvFlagOptions) {
        if self.options == options {
            return;
        }
        self.options = options;
        for node in &mut self.nodes {
            if node.invalid.is_none() {
                node.env_flags = node.params.compute_env_flags(&options);
            }
        }
    }

    pub fn env_flag_options(&self) -> &EnvFlagOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 父先于子的全部节点
    pub fn ids(&self) -> impl Iterator<Item = EffectId> + '_ {
        (0..self.nodes.len()).map(EffectId)
    }

    pub fn name(&self, id: EffectId) -> &str {
        &self.nodes[id.0].name
    }

    /// 根效果名，即整棵树的名字
    pub fn root_name(&self) -> &str {
        self.name(EffectId::ROOT)
    }

    /// 以 `.` 连接的完整名字
    pub fn full_name(&self, id: EffectId) -> String {
        let mut parts = vec![self.nodes[id.0].name.as_str()];
        let mut cur = self.nodes[id.0].parent;
        while let Some(p) = cur {
            parts.push(self.nodes[p.0].name.as_str());
            cur = self.nodes[p.0].parent;
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn params(&self, id: EffectId) -> &EffectParams {
        &self.nodes[id.0].params
    }

    pub fn env_flags(&self, id: EffectId) -> EnvFlags {
        self.nodes[id.0].env_flags
    }

    pub fn parent(&self, id: EffectId) -> Option<EffectId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: EffectId) -> &[EffectId] {
        &self.nodes[id.0].children
    }

    pub fn invalid_reason(&self, id: EffectId) -> Option<&ParamError> {
        self.nodes[id.0].invalid.as_ref()
    }

    /// 参数启用且校验通过
    pub fn is_enabled(&self, id: EffectId) -> bool {
        let node = &self.nodes[id.0];
        node.params.enabled && node.invalid.is_none()
    }

    /// 启用且会产生输出（渲染或附加效果）
    pub fn is_active(&self, id: EffectId) -> bool {
        self.is_enabled(id)
            && (self.nodes[id.0].env_flags.renders()
                || self.nodes[id.0].env_flags.intersects(EnvFlags::EFF_ANY)
                || !self.nodes[id.0].children.is_empty())
    }

    pub fn find_child(&self, id: EffectId, name: &str) -> Option<EffectId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name == name)
    }

    /// 按完整名字查找，如 `"fire.sparks.embers"`
    pub fn find(&self, full_name: &str) -> Option<EffectId> {
        let mut parts = full_name.split('.');
        if parts.next()? != self.root_name() {
            return None;
        }
        parts.try_fold(EffectId::ROOT, |id, part| self.find_child(id, part))
    }

    /// 间接父效果：沿祖先链找到第一个设置了触发方式的启用节点，返回其父节点
    pub fn indirect_parent(&self, id: EffectId) -> Option<EffectId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = &self.nodes[c.0];
            if self.is_enabled(c) && node.params.spawn_indirection != SpawnIndirection::None {
                return node.parent;
            }
            cur = node.parent;
        }
        None
    }

    /// 效果（可含子效果）最长持续时间
    pub fn max_effect_life(&self, id: EffectId, opts: &MaxLifeOpts) -> f32 {
        let mut life = 0.0f32;
        if self.is_enabled(id) {
            let params = self.params(id);
            if opts.emitter_max_life > 0.0 {
                life = if params.pulse_period.is_set() {
                    f32::INFINITY
                } else {
                    params.max_emitter_life()
                };
                if let Some(parent) = self.indirect_parent(id) {
                    life = life.min(self.params(parent).max_particle_life());
                }
                life = life.min(opts.emitter_max_life);
                if opts.particle_life {
                    life += params.particle_life_time.max_value();
                }
            } else if opts.particle_life {
                life += params.max_particle_life();
            }
        }

        if opts.all_children || opts.indirect_children {
            for &child in self.children(id) {
                if self.indirect_parent(child).is_some() {
                    let child_opts = MaxLifeOpts {
                        emitter_max_life: life,
                        all_children: true,
                        ..*opts
                    };
                    life = life.max(self.max_effect_life(child, &child_opts));
                } else if opts.all_children {
                    life = life.max(self.max_effect_life(child, opts));
                }
            }
        }
        life
    }

    /// 达到稳定粒子数所需时间
    pub fn equilibrium_age(&self, id: EffectId, all: bool) -> f32 {
        let mut age = 0.0f32;
        if self.is_enabled(id) && self.params(id).has_equilibrium() {
            let params = self.params(id);
            age = params.spawn_delay.max_value() + params.max_particle_life();
            if let Some(parent) = self.indirect_parent(id) {
                age += self.equilibrium_age(parent, false);
            }
        }

        if all {
            for &child in self.children(id) {
                if self.is_enabled(child)
                    && self.params(child).spawn_indirection == SpawnIndirection::None
                {
                    age = age.max(self.equilibrium_age(child, true));
                }
            }
        }
        age
    }

    /// 最大粒子尺寸；相对父粒子运动的间接子效果按父粒子尺寸缩放
    pub fn max_particle_size(&self, id: EffectId, as_parent: bool) -> f32 {
        let params = self.params(id);
        let mut size = params.size.max_value();
        if !as_parent {
            if let Some(geom) = &params.geometry {
                size *= geom.radius;
            }
        }
        if let Some(parent) = self.parent(id) {
            if params.spawn_indirection != SpawnIndirection::None && params.move_relative_emitter {
                size *= self.max_particle_size(parent, true);
            }
        }
        size
    }

    /// 统计树中节点状态
    pub fn effect_counts(&self) -> EffectCounts {
        let mut counts = EffectCounts::default();
        for id in self.ids() {
            counts.loaded += 1;
            if self.nodes[id.0].invalid.is_some() {
                counts.invalid += 1;
            }
            if self.is_enabled(id) {
                counts.enabled += 1;
                if self.is_active(id) {
                    counts.active += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::params::{PhysicsType, VarParam};
    use glam::Vec3;

    fn sprite(life: f32) -> EffectParams {
        EffectParams {
            count: VarParam::fixed(10.0),
            continuous: true,
            particle_life_time: VarParam::fixed(life),
            material: Some("smoke".to_string()),
            ..Default::default()
        }
    }

    fn tree_with_indirect_child() -> (EffectTree, EffectId) {
        let mut tree = EffectTree::new(
            "fire",
            EffectParams {
                emitter_life_time: VarParam::fixed(5.0),
                ..sprite(2.0)
            },
        );
        let child = tree.add_child(
            EffectId::ROOT,
            "sparks",
            EffectParams {
                spawn_indirection: SpawnIndirection::ParentStart,
                emitter_life_time: VarParam::fixed(10.0),
                ..sprite(0.5)
            },
        );
        (tree, child)
    }

    #[test]
    fn test_names_and_lookup() {
        let (mut tree, child) = tree_with_indirect_child();
        let grandchild = tree.add_child(child, "embers", sprite(1.0));

        assert_eq!(tree.full_name(grandchild), "fire.sparks.embers");
        assert_eq!(tree.find("fire.sparks.embers"), Some(grandchild));
        assert_eq!(tree.find("fire.smoke"), None);
        assert_eq!(tree.find_child(EffectId::ROOT, "sparks"), Some(child));
        assert_eq!(tree.ids().count(), 3);
    }

    #[test]
    fn test_indirect_parent() {
        let (mut tree, child) = tree_with_indirect_child();
        let grandchild = tree.add_child(child, "embers", sprite(1.0));

        assert_eq!(tree.indirect_parent(EffectId::ROOT), None);
        assert_eq!(tree.indirect_parent(child), Some(EffectId::ROOT));
        // 直接子效果继承祖先的间接关系
        assert_eq!(tree.indirect_parent(grandchild), Some(EffectId::ROOT));
    }

    #[test]
    fn test_max_effect_life_caps_indirect_child() {
        let (tree, child) = tree_with_indirect_child();
        let emitter_only = MaxLifeOpts {
            particle_life: false,
            ..Default::default()
        };
        // 子效果发射器寿命 10 秒，被父粒子寿命 2 秒截断
        assert_eq!(tree.max_effect_life(child, &emitter_only), 2.0);

        let all = MaxLifeOpts {
            all_children: true,
            ..Default::default()
        };
        // 根：5 + 2；子：min(10, 2, 7) + 0.5
        assert_eq!(tree.max_effect_life(EffectId::ROOT, &all), 7.0);
    }

    #[test]
    fn test_invalid_params_disable_node() {
        let mut tree = EffectTree::new("root", sprite(1.0));
        let bad = tree.add_child(
            EffectId::ROOT,
            "bad",
            EffectParams {
                space_loop: true,
                ..sprite(1.0)
            },
        );
        assert!(!tree.is_enabled(bad));
        assert!(tree.env_flags(bad).is_empty());
        assert!(matches!(
            tree.invalid_reason(bad),
            Some(ParamError::ZeroSpaceLoopVolume { .. })
        ));

        let counts = tree.effect_counts();
        assert_eq!(counts.loaded, 2);
        assert_eq!(counts.enabled, 1);
        assert_eq!(counts.invalid, 1);

        tree.set_params(
            bad,
            EffectParams {
                random_offset: Vec3::ONE,
                space_loop: true,
                ..sprite(1.0)
            },
        );
        assert!(tree.is_enabled(bad));
    }

    #[test]
    fn test_root_cannot_be_indirect() {
        let tree = EffectTree::new(
            "orphan",
            EffectParams {
                spawn_indirection: SpawnIndirection::ParentDeath,
                ..sprite(1.0)
            },
        );
        assert!(matches!(
            tree.invalid_reason(EffectId::ROOT),
            Some(ParamError::IndirectWithoutParent { .. })
        ));
    }

    #[test]
    fn test_env_flag_options_recompute() {
        let mut tree = EffectTree::new(
            "rocks",
            EffectParams {
                physics_type: PhysicsType::SimplePhysics,
                ..sprite(1.0)
            },
        );
        assert!(tree.env_flags(EffectId::ROOT).contains(EnvFlags::EFF_DYNAMIC_BOUNDS));

        tree.set_env_flag_options(EnvFlagOptions {
            min_physics_dynamic_bounds: PhysicsType::RigidBody,
        });
        assert!(!tree.env_flags(EffectId::ROOT).contains(EnvFlags::EFF_DYNAMIC_BOUNDS));
    }

    #[test]
    fn test_equilibrium_and_size() {
        let (mut tree, child) = tree_with_indirect_child();
        let mut params = tree.params(EffectId::ROOT).clone();
        params.emitter_life_time = VarParam::ZERO;
        params.spawn_delay = VarParam::fixed(1.0);
        tree.set_params(EffectId::ROOT, params);
        assert_eq!(tree.equilibrium_age(EffectId::ROOT, true), 3.0);

        let inherited = tree.add_child_inherited(EffectId::ROOT, "smoke", |p| {
            p.size = VarParam::fixed(3.0);
        });
        assert_eq!(tree.params(inherited).spawn_delay.max, 1.0);
        assert_eq!(tree.max_particle_size(inherited, false), 3.0);

        let mut scaled = tree.params(child).clone();
        scaled.move_relative_emitter = true;
        scaled.size = VarParam::fixed(0.5);
        tree.set_params(child, scaled);
        assert_eq!(tree.max_particle_size(child, false), 0.5);
    }
}

//! # Particle Engine
//!
//! A CPU particle simulation subsystem: hierarchical effects, emitters, sub-emitters and
//! per-effect particle containers with analytic bounds and background update jobs.
//!
//! ## Features
//!
//! - **Effect trees**: parent/child effects, indirect spawning on parent particle events
//! - **Analytic bounds**: static bounding boxes from closed-form travel math, dynamic bounds when required
//! - **Physics environment**: uniform forces plus non-uniform force areas, snapshot once per frame
//! - **Background updates**: one update job per rendered emitter, synced before rendering
//! - **Renderer contract**: frustum culling and `bytemuck` vertex records
//!
//! ### Example
//!
//! ```rust
//! use particle_engine::config::ParticleConfig;
//! use particle_engine::effect::{EffectParams, EffectTree, VarParam};
//! use particle_engine::math::Location;
//! use particle_engine::particles::{ParticleManager, SpawnParams};
//! use particle_engine::physics::StaticPhysicsWorld;
//! use std::sync::Arc;
//!
//! let config = ParticleConfig { thread_update: false, ..Default::default() };
//! let mut manager = ParticleManager::new(config, Arc::new(StaticPhysicsWorld::default())).unwrap();
//! manager.register_effect(EffectTree::new(
//!     "sparks",
//!     EffectParams { count: VarParam::fixed(20.0), ..Default::default() },
//! ));
//! let id = manager.create_emitter("sparks", Location::IDENTITY, SpawnParams::default()).unwrap();
//! assert!(id.is_some());
//! manager.update(1.0 / 60.0);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: errors, logging, job scheduling
//! - [`config`]: subsystem configuration
//! - [`math`]: boxes, locations, frustum and camera
//! - [`effect`]: effect parameters, flags, bounds math and trees
//! - [`physics`]: forces, physics world service, per-frame environment
//! - [`particles`]: containers, emitters, manager
//! - [`render`]: renderer collaborator contract
//! - [`systems`]: `bevy_ecs` glue

/// Core infrastructure: errors, logging and background jobs
pub mod core;
/// Configuration system
pub mod config;
/// Math primitives
pub mod math;
/// Effect definitions
pub mod effect;
/// Forces and physics world services
pub mod physics;
/// Particle simulation
pub mod particles;
/// Renderer collaborator contract
pub mod render;
/// ECS integration
pub mod systems;

pub use config::ParticleConfig;
pub use core::error::{ParticleError, ParticleResult};
pub use particles::{ParticleEmitter, ParticleManager, SpawnParams};

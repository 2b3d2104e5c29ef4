//! 操舵（Seek + Arrive + Separation）による速度・位置の更新
//!
//! 物理エンジンは使わず、目標速度と現在速度の差を一定割合だけ取り込む
//! 慣性モデルで滑らかな移動を表現します。UAV は3軸、UGV は地表面の2軸で動きます。

use crate::models::common::{Position3D, Velocity3D};
use crate::scenario::{UavTuning, UgvTuning};

/// 操舵力を速度へ取り込む割合（慣性係数）
pub const STEERING_FACTOR: f64 = 0.05;

/// この距離未満で目的地に吸着する
pub const ARRIVAL_SNAP_DISTANCE: f64 = 0.1;

/// 分離（近接回避）項のパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub radius: f64,
    pub weight: f64,
    /// 目的地までこの距離を超える場合のみ分離を有効にする
    pub min_distance: f64,
}

/// エージェント種別ごとの操舵特性
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringProfile {
    pub max_speed: f64,
    pub slow_radius: f64,
    /// true の場合は鉛直軸を無視して地表面上だけで操舵する
    pub planar: bool,
    pub separation: Option<Separation>,
}

impl SteeringProfile {
    pub fn uav(tuning: &UavTuning) -> Self {
        Self {
            max_speed: tuning.max_speed,
            slow_radius: tuning.slow_radius,
            planar: false,
            separation: Some(Separation {
                radius: tuning.separation_radius,
                weight: tuning.separation_weight,
                min_distance: tuning.separation_min_distance,
            }),
        }
    }

    pub fn ugv(tuning: &UgvTuning) -> Self {
        Self {
            max_speed: tuning.max_speed,
            slow_radius: tuning.slow_radius,
            planar: true,
            separation: None,
        }
    }
}

/// 1ティック分の操舵を行い、速度と位置をその場で更新する
///
/// # 引数
///
/// * `position` / `velocity` - 更新対象エージェントの位置と速度
/// * `destination` - 目的地
/// * `profile` - 操舵特性
/// * `neighbors` - 自分以外の全エージェントの現在位置（分離項で使用）
pub fn steer(
    position: &mut Position3D,
    velocity: &mut Velocity3D,
    destination: Position3D,
    profile: &SteeringProfile,
    neighbors: &[Position3D],
) {
    let mut displacement = destination - *position;
    if profile.planar {
        displacement = displacement.flatten();
    }
    let dist = displacement.magnitude();

    if dist < ARRIVAL_SNAP_DISTANCE {
        position.x = destination.x;
        position.z = destination.z;
        if !profile.planar {
            position.y = destination.y;
        }
        *velocity = Velocity3D::ZERO;
        return;
    }

    // Arrive: slow_radius 内では距離に比例して減速
    let target_speed = profile.max_speed * (dist / profile.slow_radius).min(1.0);
    let desired = displacement * (target_speed / dist);
    let mut steering = desired - *velocity;

    if let Some(separation) = profile.separation.filter(|s| dist > s.min_distance) {
        steering += separation_force(*position, *velocity, neighbors, profile.max_speed, &separation);
    }

    if profile.planar {
        steering = steering.flatten();
    }

    *velocity += steering * STEERING_FACTOR;
    *position += *velocity;
}

/// 近接する他エージェントから離れる方向の操舵力（重み込み）
fn separation_force(
    position: Position3D,
    velocity: Velocity3D,
    neighbors: &[Position3D],
    max_speed: f64,
    separation: &Separation,
) -> Velocity3D {
    let mut sum = Velocity3D::ZERO;
    let mut count = 0usize;

    for other in neighbors {
        let d = position.distance_3d(other);
        if d > 0.0 && d < separation.radius {
            sum += (position - *other) * (1.0 / d);
            count += 1;
        }
    }

    if count == 0 {
        return Velocity3D::ZERO;
    }

    let average = sum * (1.0 / count as f64);
    if average.magnitude() == 0.0 {
        return Velocity3D::ZERO;
    }

    (average.normalize() * max_speed - velocity) * separation.weight
}

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 3次元位置を表す構造体
///
/// 座標系は y 軸が高度、x-z 平面が地表面です。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64, // 高度
    pub z: f64,
}

impl Position3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 地表面（x-z 平面）での2次元距離を計算
    pub fn distance_horizontal(&self, other: &Position3D) -> f64 {
        ((self.x - other.x).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    /// 3次元距離を計算
    pub fn distance_3d(&self, other: &Position3D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    /// 高度だけを差し替えた位置を返す
    pub fn with_altitude(&self, altitude: f64) -> Self {
        Self::new(self.x, altitude, self.z)
    }

    /// 全成分が有限値かどうか
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add<Velocity3D> for Position3D {
    type Output = Self;

    fn add(self, velocity: Velocity3D) -> Self::Output {
        Self::new(self.x + velocity.x, self.y + velocity.y, self.z + velocity.z)
    }
}

impl AddAssign<Velocity3D> for Position3D {
    fn add_assign(&mut self, velocity: Velocity3D) {
        *self = *self + velocity;
    }
}

impl Sub for Position3D {
    type Output = Velocity3D;

    /// 2点間の変位ベクトル
    fn sub(self, other: Self) -> Self::Output {
        Velocity3D::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// 3次元速度（1ティックあたりの移動量）を表す構造体
///
/// 変位や操舵力など、向きと大きさを持つ量の表現にも使います。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Velocity3D {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 速度ベクトルの大きさ
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }

    /// 速度ベクトルを正規化（ゼロベクトルはそのまま返す）
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag > 0.0 {
            Self::new(self.x / mag, self.y / mag, self.z / mag)
        } else {
            *self
        }
    }

    /// 鉛直成分を落とした地表面ベクトル
    pub fn flatten(&self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }
}

impl Add for Velocity3D {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Velocity3D {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Velocity3D {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Velocity3D {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// エージェントの種類を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentType {
    Uav,
    Ugv,
}

// 检测结果与人口统计
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

/// 年龄段（声明顺序即展示顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeRange {
    #[serde(rename = "0-12")]
    Child,
    #[serde(rename = "13-19")]
    Teen,
    #[serde(rename = "20-35")]
    YoungAdult,
    #[serde(rename = "36-50")]
    Adult,
    #[serde(rename = "51-70")]
    Senior,
    #[serde(rename = "70+")]
    Elder,
}

impl AgeRange {
    pub const ALL: [AgeRange; 6] = [
        AgeRange::Child,
        AgeRange::Teen,
        AgeRange::YoungAdult,
        AgeRange::Adult,
        AgeRange::Senior,
        AgeRange::Elder,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgeRange::Child => "0-12",
            AgeRange::Teen => "13-19",
            AgeRange::YoungAdult => "20-35",
            AgeRange::Adult => "36-50",
            AgeRange::Senior => "51-70",
            AgeRange::Elder => "70+",
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 单个检测到的人
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub tracking_id: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub gender: Gender,
    pub age_range: AgeRange,
    pub is_staff: bool,
}

/// 人口统计汇总（每次请求重新计算）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicsSummary {
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub age_distribution: BTreeMap<AgeRange, usize>,
}

impl DemographicsSummary {
    /// 有检测结果时列出所有年龄段（含 0），无结果时分布为空
    pub fn from_detections(detections: &[Detection]) -> Self {
        if detections.is_empty() {
            return Self::default();
        }

        let mut age_distribution: BTreeMap<AgeRange, usize> =
            AgeRange::ALL.iter().map(|range| (*range, 0)).collect();
        let mut male = 0;
        let mut female = 0;

        for detection in detections {
            match detection.gender {
                Gender::Male => male += 1,
                Gender::Female => female += 1,
            }
            *age_distribution.entry(detection.age_range).or_insert(0) += 1;
        }

        Self {
            total: detections.len(),
            male,
            female,
            age_distribution,
        }
    }
}

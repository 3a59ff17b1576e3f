// 通用类型定义

/// 插件 ID 类型（由插件来源名称派生，发现后不可变）
pub type PluginId = String;

/// 排序位置的哨兵值：未指定位置，排在最后
pub const UNORDERED_POSITION: i64 = -1;

/// 将排序位置转换为排序键，哨兵值视为无穷大
pub fn position_sort_key(position: i64) -> i64 {
    if position == UNORDERED_POSITION {
        i64::MAX
    } else {
        position
    }
}

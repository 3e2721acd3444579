//! 核心宏定义
//!
//! 配置结构和统计结构大多只是字段默认值的罗列，用宏收敛重复代码。

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use particle_engine::impl_default;
///
/// struct SortSettings {
///     quality: u8,
///     bias: f32,
/// }
///
/// impl_default!(SortSettings {
///     quality: 1,
///     bias: 0.0,
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    struct TimeWindow {
        start: f32,
        stop: f32,
    }

    impl_default!(TimeWindow {
        start: 0.0,
        stop: f32::INFINITY,
    });

    #[test]
    fn test_impl_default() {
        let w = TimeWindow::default();
        assert_eq!(w.start, 0.0);
        assert!(w.stop.is_infinite());
    }
}

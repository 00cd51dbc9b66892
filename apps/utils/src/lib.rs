//! 命令行程序依赖的通用组件.

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 向 `w` 写一条分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 可选指标的展示形式. 缺失或非有限值显示为 `/`.
pub fn metric_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) if f.is_finite() => format!("{f:.4}"),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_to_display() {
        assert_eq!(metric_to_display(Some(0.123456)), "0.1235");
        assert_eq!(metric_to_display(None), "/");
        assert_eq!(metric_to_display(Some(f64::NEG_INFINITY)), "/");
    }

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
    }
}

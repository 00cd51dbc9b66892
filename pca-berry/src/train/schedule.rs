//! 学习率调度.

/// 阶梯式学习率: 每 `step_size` 步乘以 `gamma`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepLr {
    base: f64,
    step_size: usize,
    gamma: f64,
    steps: usize,
}

impl StepLr {
    /// 构建. `step_size` 为 0 时按 1 处理.
    pub fn new(base: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base,
            step_size: step_size.max(1),
            gamma,
            steps: 0,
        }
    }

    /// 按总轮数构建: 每四分之一的轮数衰减为原来的十分之一.
    #[inline]
    pub fn quarters(base: f64, epochs: usize) -> Self {
        Self::new(base, epochs / 4, 0.1)
    }

    /// 当前学习率.
    #[inline]
    pub fn lr(&self) -> f64 {
        self.base * self.gamma.powi((self.steps / self.step_size) as i32)
    }

    /// 前进一步.
    #[inline]
    pub fn step(&mut self) {
        self.steps += 1;
    }

    /// 已前进的步数.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::StepLr;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_step_lr() {
        let mut s = StepLr::quarters(1e-3, 8);
        let mut lrs = Vec::new();
        for _ in 0..8 {
            lrs.push(s.lr());
            s.step();
        }
        assert!(float_eq(lrs[0], 1e-3));
        assert!(float_eq(lrs[1], 1e-3));
        assert!(float_eq(lrs[2], 1e-4));
        assert!(float_eq(lrs[5], 1e-5));
        assert!(float_eq(lrs[7], 1e-6));
        assert_eq!(s.steps(), 8);
    }

    #[test]
    fn test_small_epoch_count() {
        let mut s = StepLr::quarters(0.5, 2);
        s.step();
        assert!(float_eq(s.lr(), 0.05));
    }
}

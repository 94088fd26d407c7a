use std::fmt;

/// a block of the statistics report.
pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
            max_width,
        }
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
    max_width: usize,
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0)
            .min(self.max_width.max(20));
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

/// `part / total` as a percentage with six decimals; `0` of nothing is 0%.
pub fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return format!("{:.6}", 0.);
    }
    format!("{:.6}", 100. * part as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    struct FixedView;

    impl Stat for Fixed {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(FixedView)
        }
    }

    impl StatView for FixedView {
        fn header(&self) -> &'static str {
            "fixed"
        }
        fn width(&self) -> usize {
            24
        }
    }

    impl fmt::Display for FixedView {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "  body")
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!("50.000000", percent(1, 2));
        assert_eq!("0.000000", percent(0, 0));
    }
    #[test]
    fn test_report_layout() {
        let mut stats = Stats::default();
        stats.push(Box::new(Fixed));
        let out = stats.view(80).to_string();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            vec![
                "------ statistics ------",
                "fixed:",
                "  body",
                "------------------------"
            ],
            lines
        );
    }
}

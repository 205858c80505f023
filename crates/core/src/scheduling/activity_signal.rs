/// User-activity signals that keep a session alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    MouseMove,
    KeyDown,
    Click,
    Scroll,
}

impl ActivitySignal {
    pub const ALL: &'static [ActivitySignal] = &[
        ActivitySignal::MouseMove,
        ActivitySignal::KeyDown,
        ActivitySignal::Click,
        ActivitySignal::Scroll,
    ];
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivitySignal::MouseMove => write!(f, "mousemove"),
            ActivitySignal::KeyDown => write!(f, "keydown"),
            ActivitySignal::Click => write!(f, "click"),
            ActivitySignal::Scroll => write!(f, "scroll"),
        }
    }
}

impl std::str::FromStr for ActivitySignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mousemove" | "mouse" | "move" => Ok(ActivitySignal::MouseMove),
            "keydown" | "key" => Ok(ActivitySignal::KeyDown),
            "click" => Ok(ActivitySignal::Click),
            "scroll" => Ok(ActivitySignal::Scroll),
            other => Err(format!("unknown activity signal '{other}'")),
        }
    }
}

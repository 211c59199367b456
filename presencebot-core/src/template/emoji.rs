use rand::seq::IndexedRandom;

const DECORATIVE: &[&str] = &[
    "❤️", "🧡", "💛", "💚", "💙", "💜", "🤍", "🖤", "🤎", "💖", "💗", "💓", "💞", "💕", "💘",
    "💝", "💫", "⭐", "🌟", "✨", "⚡", "🔥", "🌈", "☀️", "🌙", "☁️", "❄️", "🌸", "🌺", "🌻",
    "🌼", "🍀", "🍁", "🍂", "🍃", "🌊", "🎵", "🎶", "🎧", "🎮", "🎲", "🎯", "🎨", "🎬", "🎤",
    "🏆", "💎", "🔮", "🎀", "🎁", "🍓", "🍒", "🍑", "🍉", "🍭", "🍬", "🧁", "☕", "🍵", "🐱",
    "🐶", "🐰", "🦊", "🐻", "🐼", "🐨", "🦋", "🐝", "🌍", "🚀", "💮", "💯", "🔱", "🔘", "🔗",
    "➰", "♠", "♥", "♣", "♦", "✔", "☑", "🔺", "🔻", "🔶", "🔷", "🔸", "🔹", "⚫", "⚪", "🔴",
    "🔵",
];

const CLOCKS: [&str; 12] = [
    "🕛", "🕐", "🕑", "🕒", "🕓", "🕔", "🕕", "🕖", "🕗", "🕘", "🕙", "🕚",
];

pub fn random() -> &'static str {
    DECORATIVE.choose(&mut rand::rng()).copied().unwrap_or("✨")
}

/// Sun during the day (06:00 to 17:59), moon otherwise.
pub fn time_of_day(hour: u32) -> &'static str {
    if (6..18).contains(&hour) { "☀️" } else { "🌙" }
}

pub fn clock(hour: u32) -> &'static str {
    CLOCKS[(hour % 12) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_and_night() {
        assert_eq!(time_of_day(6), "☀️");
        assert_eq!(time_of_day(17), "☀️");
        assert_eq!(time_of_day(18), "🌙");
        assert_eq!(time_of_day(0), "🌙");
    }

    #[test]
    fn clock_faces_wrap_at_twelve() {
        assert_eq!(clock(0), "🕛");
        assert_eq!(clock(12), "🕛");
        assert_eq!(clock(15), "🕒");
    }

    #[test]
    fn random_comes_from_the_list() {
        for _ in 0..20 {
            assert!(DECORATIVE.contains(&random()));
        }
    }
}

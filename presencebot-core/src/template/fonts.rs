//! Fixed styled alphabets for `{NFk(...)}` blocks.

struct FontTable {
    lower: &'static str,
    upper: &'static str,
    digits: &'static str,
}

const FONTS: [FontTable; 6] = [
    // 1: Thai digits, cycling through the alphabet
    FontTable {
        lower: "๐๑๒๓๔๕๖๗๘๙๐๑๒๓๔๕๖๗๘๙๐๑๒๓๔๕",
        upper: "๐๑๒๓๔๕๖๗๘๙๐๑๒๓๔๕๖๗๘๙๐๑๒๓๔๕",
        digits: "๐๑๒๓๔๕๖๗๘๙",
    },
    // 2: double-struck
    FontTable {
        lower: "𝕒𝕓𝕔𝕕𝕖𝕗𝕘𝕙𝕚𝕛𝕜𝕝𝕞𝕟𝕠𝕡𝕢𝕣𝕤𝕥𝕦𝕧𝕨𝕩𝕪𝕫",
        upper: "𝔸𝔹ℂ𝔻𝔼𝔽𝔾ℍ𝕀𝕁𝕂𝕃𝕄ℕ𝕆ℙℚℝ𝕊𝕋𝕌𝕍𝕎𝕏𝕐ℤ",
        digits: "𝟘𝟙𝟚𝟛𝟜𝟝𝟞𝟟𝟠𝟡",
    },
    // 3: sans-serif bold
    FontTable {
        lower: "𝗮𝗯𝗰𝗱𝗲𝗳𝗴𝗵𝗶𝗷𝗸𝗹𝗺𝗻𝗼𝗽𝗾𝗿𝘀𝘁𝘂𝘃𝘄𝘅𝘆𝘇",
        upper: "𝗔𝗕𝗖𝗗𝗘𝗙𝗚𝗛𝗜𝗝𝗞𝗟𝗠𝗡𝗢𝗣𝗤𝗥𝗦𝗧𝗨𝗩𝗪𝗫𝗬𝗭",
        digits: "𝟬𝟭𝟮𝟯𝟰𝟱𝟲𝟳𝟴𝟵",
    },
    // 4: script
    FontTable {
        lower: "𝒶𝒷𝒸𝒹𝑒𝒻𝑔𝒽𝒾𝒿𝓀𝓁𝓂𝓃𝑜𝓅𝓆𝓇𝓈𝓉𝓊𝓋𝓌𝓍𝓎𝓏",
        upper: "𝒜ℬ𝒞𝒟ℰℱ𝒢ℋℐ𝒥𝒦ℒℳ𝒩𝒪𝒫𝒬ℛ𝒮𝒯𝒰𝒱𝒲𝒳𝒴𝒵",
        digits: "0123456789",
    },
    // 5: bold script
    FontTable {
        lower: "𝓪𝓫𝓬𝓭𝓮𝓯𝓰𝓱𝓲𝓳𝓴𝓵𝓶𝓷𝓸𝓹𝓺𝓻𝓼𝓽𝓾𝓿𝔀𝔁𝔂𝔃",
        upper: "𝓐𝓑𝓒𝓓𝓔𝓕𝓖𝓗𝓘𝓙𝓚𝓛𝓜𝓝𝓞𝓟𝓠𝓡𝓢𝓣𝓤𝓥𝓦𝓧𝓨𝓩",
        digits: "0123456789",
    },
    // 6: circled
    FontTable {
        lower: "ⓐⓑⓒⓓⓔⓕⓖⓗⓘⓙⓚⓛⓜⓝⓞⓟⓠⓡⓢⓣⓤⓥⓦⓧⓨⓩ",
        upper: "ⒶⒷⒸⒹⒺⒻⒼⒽⒾⒿⓀⓁⓂⓃⓄⓅⓆⓇⓈⓉⓊⓋⓌⓍⓎⓏ",
        digits: "⓪①②③④⑤⑥⑦⑧⑨",
    },
];

impl FontTable {
    fn map(&self, c: char) -> Option<char> {
        let (alphabet, base) = match c {
            'a'..='z' => (self.lower, b'a'),
            'A'..='Z' => (self.upper, b'A'),
            '0'..='9' => (self.digits, b'0'),
            _ => return None,
        };
        alphabet.chars().nth((c as u8 - base) as usize)
    }
}

/// Number of available font variants.
pub const FONT_COUNT: u32 = FONTS.len() as u32;

/// Restyles `text` with font `variant` (1-based). Characters outside
/// latin letters and digits pass through. `None` for an unknown variant.
pub fn apply_font(variant: u32, text: &str) -> Option<String> {
    let table = FONTS.get((variant as usize).checked_sub(1)?)?;
    Some(text.chars().map(|c| table.map(c).unwrap_or(c)).collect())
}

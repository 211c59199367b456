// File: presencebot-core/src/template/variables.rs
//
// Builds the per-render variable table from the live data sources.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use presencebot_common::models::{AccountIdentity, GuildSummary};

use super::context::TemplateContext;
use super::emoji;
use crate::samplers::weather::DEFAULT_TIMEZONE;
use crate::samplers::{SystemSnapshot, WeatherSnapshot};

/// Looks a guild up by id in whatever the transport has cached.
pub type GuildLookup = Arc<dyn Fn(&str) -> Option<GuildSummary> + Send + Sync>;

const TH_WEEKDAYS: [&str; 7] = ["อาทิตย์", "จันทร์", "อังคาร", "พุธ", "พฤหัสบดี", "ศุกร์", "เสาร์"];
const TH_WEEKDAYS_SHORT: [&str; 7] = ["อา.", "จ.", "อ.", "พ.", "พฤ.", "ศ.", "ส."];
const TH_MONTHS: [&str; 12] = [
    "มกราคม", "กุมภาพันธ์", "มีนาคม", "เมษายน", "พฤษภาคม", "มิถุนายน",
    "กรกฎาคม", "สิงหาคม", "กันยายน", "ตุลาคม", "พฤศจิกายน", "ธันวาคม",
];
const TH_MONTHS_SHORT: [&str; 12] = [
    "ม.ค.", "ก.พ.", "มี.ค.", "เม.ย.", "พ.ค.", "มิ.ย.", "ก.ค.", "ส.ค.", "ก.ย.", "ต.ค.", "พ.ย.", "ธ.ค.",
];

/// Gregorian to Buddhist era.
const BUDDHIST_ERA_OFFSET: i32 = 543;

/// Everything a render can draw from.
#[derive(Clone)]
pub struct VariableSources {
    pub now: DateTime<Utc>,
    pub weather: WeatherSnapshot,
    pub system: SystemSnapshot,
    pub identity: Option<AccountIdentity>,
    pub guilds: Option<GuildLookup>,
    pub latency: Option<Duration>,
    pub uptime: Duration,
    pub patch: String,
}

impl VariableSources {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            weather: WeatherSnapshot::default(),
            system: SystemSnapshot::default(),
            identity: None,
            guilds: None,
            latency: None,
            uptime: Duration::ZERO,
            patch: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn timezone(&self) -> Tz {
        self.weather
            .timezone
            .parse::<Tz>()
            .or_else(|_| DEFAULT_TIMEZONE.parse::<Tz>())
            .unwrap_or(chrono_tz::Asia::Bangkok)
    }
}

pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

pub fn build_context(src: &VariableSources) -> TemplateContext {
    let mut ctx = TemplateContext::new();
    add_clock(&mut ctx, src);
    add_weather(&mut ctx, &src.weather);
    add_system(&mut ctx, src);
    add_user(&mut ctx, src);
    add_misc(&mut ctx, src);
    ctx
}

fn add_clock(ctx: &mut TemplateContext, src: &VariableSources) {
    let local = src.now.with_timezone(&src.timezone());
    let weekday = local.weekday().num_days_from_sunday() as usize;
    let month = local.month0() as usize;
    let th_year = local.year() + BUDDHIST_ERA_OFFSET;

    ctx.literal("hour:1", local.format("%H"))
        .literal("hour:2", local.format("%I"))
        .literal("min:1", local.format("%M"))
        .literal("min:2", local.format("%M %p"))
        .literal("th=date", local.day())
        .literal("th=week:1", TH_WEEKDAYS_SHORT[weekday])
        .literal("th=week:2", TH_WEEKDAYS[weekday])
        .literal("th=month:1", local.month())
        .literal("th=month:2", TH_MONTHS_SHORT[month])
        .literal("th=month:3", TH_MONTHS[month])
        .literal("th=year:1", format!("{:02}", th_year.rem_euclid(100)))
        .literal("th=year:2", th_year)
        .literal("en=date", ordinal(local.day()))
        .literal("en=week:1", local.format("%a"))
        .literal("en=week:2", local.format("%A"))
        .literal("en=month:1", local.month())
        .literal("en=month:2", local.format("%b"))
        .literal("en=month:3", local.format("%B"))
        .literal("en=year:1", local.format("%y"))
        .literal("en=year:2", local.year());

    let hour = local.hour();
    ctx.literal("emoji:time", emoji::time_of_day(hour))
        .thunk("emoji:clock", move || emoji::clock(hour).to_string());
}

fn add_weather(ctx: &mut TemplateContext, w: &WeatherSnapshot) {
    ctx.literal("city", &w.city)
        .literal("region", &w.region)
        .literal("country", &w.country)
        .literal("temp:c", w.temp_c)
        .literal("temp:f", w.temp_f)
        .literal("wind:kph", w.wind_kph)
        .literal("wind:mph", w.wind_mph)
        .literal("wind:degree", w.wind_degree)
        .literal("wind:dir", &w.wind_dir)
        .literal("pressure:mb", w.pressure_mb)
        .literal("pressure:in", w.pressure_in)
        .literal("precip:mm", w.precip_mm)
        .literal("precip:in", w.precip_in)
        .literal("gust:kph", w.gust_kph)
        .literal("gust:mph", w.gust_mph)
        .literal("feelslike:c", w.feelslike_c)
        .literal("feelslike:f", w.feelslike_f)
        .literal("windchill:c", w.windchill_c)
        .literal("windchill:f", w.windchill_f)
        .literal("heatindex:c", w.heatindex_c)
        .literal("heatindex:f", w.heatindex_f)
        .literal("dewpoint:c", w.dewpoint_c)
        .literal("dewpoint:f", w.dewpoint_f)
        .literal("vis:km", w.vis_km)
        .literal("vis:mi", w.vis_miles)
        .literal("humidity", w.humidity)
        .literal("cloud", w.cloud)
        .literal("uv", w.uv)
        .literal("co", w.co)
        .literal("no2", w.no2)
        .literal("o3", w.o3)
        .literal("so2", w.so2)
        .literal("pm2.5", w.pm2_5)
        .literal("pm10", w.pm10);
}

fn add_system(ctx: &mut TemplateContext, src: &VariableSources) {
    let s = &src.system;
    let ping = src.latency.map(|d| d.as_millis()).unwrap_or(0);
    let up = src.uptime.as_secs();

    ctx.literal("ping", ping)
        .literal("patch", &src.patch)
        .literal("cpu:name", &s.cpu_name)
        .literal("cpu:cores", s.cpu_cores)
        .literal("cpu:speed", &s.cpu_speed)
        .literal("cpu:usage", s.cpu_usage)
        .literal("ram:usage", s.ram_usage)
        .literal("uptime:days", up / 86_400)
        .literal("uptime:hours", (up / 3_600) % 24)
        .literal("uptime:minutes", (up / 60) % 60)
        .literal("uptime:seconds", up % 60);
}

fn add_user(ctx: &mut TemplateContext, src: &VariableSources) {
    let identity = src.identity.clone().unwrap_or_default();
    let name = if identity.username.is_empty() { "User".to_string() } else { identity.username };
    ctx.literal("user:name", name)
        .literal("user:icon", identity.avatar_url.unwrap_or_default())
        .literal("user:banner", identity.banner_url.unwrap_or_default());

    let lookup = src.guilds.clone();
    let find = move |id: &str| lookup.as_ref().and_then(|f| f(id.trim()));

    let f = find.clone();
    ctx.unary("guild=members", move |id| {
        Ok(f(id)
            .and_then(|g| g.member_count)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string()))
    });
    let f = find.clone();
    ctx.unary("guild=name", move |id| {
        Ok(f(id)
            .map(|g| g.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()))
    });
    ctx.unary("guild=icon", move |id| Ok(find(id).and_then(|g| g.icon_url).unwrap_or_default()));
}

fn add_misc(ctx: &mut TemplateContext, _src: &VariableSources) {
    ctx.thunk("emoji:random", || emoji::random().to_string());
    ctx.unary("random", |args| {
        use rand::seq::IndexedRandom;
        let options: Vec<&str> = args.split(',').map(str::trim).collect();
        Ok(options
            .choose(&mut rand::rng())
            .map(|s| s.to_string())
            .unwrap_or_else(|| args.to_string()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::render_str;
    use chrono::TimeZone;

    fn sources() -> VariableSources {
        // 2024-03-05 14:07 in Bangkok
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 7, 9).unwrap();
        let mut src = VariableSources::new(now);
        src.identity = Some(AccountIdentity {
            user_id: "1".into(),
            username: "Ann".into(),
            avatar_url: Some("https://cdn.example/a.png".into()),
            banner_url: None,
        });
        src.latency = Some(Duration::from_millis(42));
        src.uptime = Duration::from_secs(90_061);
        src
    }

    #[test]
    fn clock_variables_use_the_weather_timezone() {
        let ctx = build_context(&sources());
        assert_eq!(render_str("{hour:1}:{min:1}", &ctx), "14:07");
        assert_eq!(render_str("{hour:2} {min:2}", &ctx), "02 07 PM");
        assert_eq!(render_str("{en=date} {en=month:3} {en=year:2}", &ctx), "5th March 2024");
        assert_eq!(render_str("{th=year:2} {th=year:1}", &ctx), "2567 67");
        assert_eq!(render_str("{th=month:3} {th=week:2}", &ctx), "มีนาคม อังคาร");
        assert_eq!(render_str("{emoji:time}", &ctx), "☀️");
        assert_eq!(render_str("{emoji:clock}", &ctx), "🕑");
    }

    #[test]
    fn weather_and_system_defaults() {
        let ctx = build_context(&sources());
        assert_eq!(render_str("{city} {temp:f} {vis:mi} {wind:dir}", &ctx), "Unknown 32 6.2 N");
        assert_eq!(render_str("{ping} {cpu:name}", &ctx), "42 CPU");
        assert_eq!(
            render_str("{uptime:days}d {uptime:hours}h {uptime:minutes}m {uptime:seconds}s", &ctx),
            "1d 1h 1m 1s"
        );
    }

    #[test]
    fn user_and_guild_lookups() {
        let mut src = sources();
        src.guilds = Some(Arc::new(|id: &str| {
            (id == "77").then(|| GuildSummary {
                name: "Lounge".into(),
                member_count: Some(12),
                icon_url: None,
            })
        }));
        let ctx = build_context(&src);
        assert_eq!(render_str("{user:name} {user:banner}|", &ctx), "Ann |");
        assert_eq!(render_str("{guild=name:77} {guild=members:77}", &ctx), "Lounge 12");
        assert_eq!(render_str("{guild=name:1} {guild=members:1}", &ctx), "Unknown ?");
    }

    #[test]
    fn random_picks_one_option() {
        let ctx = build_context(&sources());
        let out = render_str("{random(a, b, c)}", &ctx);
        assert!(["a", "b", "c"].contains(&out.as_str()));
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(113), "113th");
    }
}

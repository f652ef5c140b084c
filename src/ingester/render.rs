//! Post rendering and hashtag selection
//!
//! Hashtags are a pure function of the deal, the local hour and a rotation
//! counter, so the same inputs always render the same post.

use crate::types::{Discount, Platform, Price};
use rust_decimal::Decimal;

pub const PLACEHOLDER_NAME: &str = "Hot Deal! 🔥";

/// Upper bound on hashtags per post
pub const MAX_HASHTAGS: usize = 3;

const GENERIC_TAGS: &[&str] = &[
    "#Deals",
    "#Offers",
    "#Discount",
    "#Sale",
    "#Loot",
    "#Savings",
    "#HotDeal",
    "#LimitedTime",
    "#FlashSale",
    "#TodayDeals",
    "#DailyDeals",
    "#ValueDeal",
];

const CATEGORIES: &[(&[&str], &[&str])] = &[
    (
        &["laptop", "mobile", "phone", "headphone", "earphone", "earbuds", "tablet", "camera"],
        &["#TechDeals", "#Electronics"],
    ),
    (
        &["shirt", "dress", "jeans", "shoe", "sandal", "kurta", "saree"],
        &["#FashionDeals", "#ClothingSale"],
    ),
    (
        &["kitchen", "cooker", "home", "furniture", "decor", "appliance"],
        &["#HomeDecor", "#KitchenDeals"],
    ),
    (
        &["beauty", "cream", "lotion", "makeup", "skincare"],
        &["#BeautyDeals"],
    ),
];

fn platform_tags(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Amazon => &["#AmazonDeals", "#AmazonIndia", "#AmazonSale"],
        Platform::Flipkart => &["#FlipkartDeals", "#FlipkartSale"],
        Platform::Myntra => &["#MyntraDeals", "#FashionSale"],
        Platform::Ajio => &["#AjioOffers", "#AjioLoot"],
        Platform::Other => &["#ExclusiveDeal", "#SpecialOffer"],
    }
}

fn time_tags(hour: u32) -> &'static [&'static str] {
    match hour {
        6..=11 => &["#MorningDeals"],
        12..=16 => &["#AfternoonDeals"],
        17..=21 => &["#EveningDeals"],
        22..=23 => &["#LateNightDeals", "#NightOwlDeals"],
        _ => &["#MidnightDeals", "#EarlyAccess", "#NightOwlDeals"],
    }
}

fn price_tier_tag(price: Price) -> &'static str {
    let amount = price.amount();
    if amount < Decimal::from(500) {
        "#Under500"
    } else if amount < Decimal::from(1000) {
        "#Under1000"
    } else if amount < Decimal::from(2000) {
        "#BudgetFriendly"
    } else {
        "#PremiumDeals"
    }
}

fn category_tags(product_name: &str) -> Option<&'static [&'static str]> {
    let lower = product_name.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, tags)| *tags)
}

fn pick(pool: &[&'static str], rotation: u64) -> &'static str {
    pool[(rotation % pool.len() as u64) as usize]
}

/// One platform tag, one time-of-day tag, then price tier, category or a
/// generic tag, in that order of preference.
pub fn select_hashtags(
    platform: Platform,
    price: Option<Price>,
    product_name: &str,
    hour: u32,
    rotation: u64,
) -> Vec<&'static str> {
    let mut tags = vec![
        pick(platform_tags(platform), rotation),
        pick(time_tags(hour), rotation),
    ];

    let third = match price {
        Some(p) => price_tier_tag(p),
        None => match category_tags(product_name) {
            Some(pool) => pick(pool, rotation),
            None => pick(GENERIC_TAGS, rotation),
        },
    };
    tags.push(third);
    tags.truncate(MAX_HASHTAGS);
    tags
}

/// Everything above the hashtag line
pub fn render_body(
    platform: Platform,
    product_name: &str,
    price: Option<Price>,
    discount: Option<Discount>,
    affiliate_url: &str,
) -> String {
    let mut body = format!("{}\n{}", platform.label(), product_name);
    if let Some(price) = price {
        body.push_str(&format!("\n💰 {}", price));
    }
    if let Some(discount) = discount {
        body.push_str(&format!("\n🎯 {}", discount));
    }
    body.push_str("\n\n");
    body.push_str(affiliate_url);
    body
}

pub fn render(body: &str, hashtags: &[&str]) -> String {
    if hashtags.is_empty() {
        return body.to_string();
    }
    format!("{}\n\n{}", body, hashtags.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hashtags_are_deterministic() {
        let a = select_hashtags(Platform::Amazon, Some(Price(dec!(1999))), "Boat earbuds", 9, 4);
        let b = select_hashtags(Platform::Amazon, Some(Price(dec!(1999))), "Boat earbuds", 9, 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), MAX_HASHTAGS);
    }

    #[test]
    fn test_hashtags_rotate_within_platform_pool() {
        let first = select_hashtags(Platform::Amazon, None, "Something", 9, 0);
        let second = select_hashtags(Platform::Amazon, None, "Something", 9, 1);
        assert_eq!(first[0], "#AmazonDeals");
        assert_eq!(second[0], "#AmazonIndia");
        assert_ne!(first[2], second[2]);
    }

    #[test]
    fn test_time_of_day_tags() {
        assert_eq!(select_hashtags(Platform::Ajio, None, "x", 7, 0)[1], "#MorningDeals");
        assert_eq!(select_hashtags(Platform::Ajio, None, "x", 13, 0)[1], "#AfternoonDeals");
        assert_eq!(select_hashtags(Platform::Ajio, None, "x", 18, 0)[1], "#EveningDeals");
        assert_eq!(select_hashtags(Platform::Ajio, None, "x", 23, 0)[1], "#LateNightDeals");
        assert_eq!(select_hashtags(Platform::Ajio, None, "x", 2, 1)[1], "#EarlyAccess");
    }

    #[test]
    fn test_price_tier_beats_category() {
        let tags = select_hashtags(Platform::Flipkart, Some(Price(dec!(450))), "Laptop stand", 10, 0);
        assert_eq!(tags[2], "#Under500");

        let tags = select_hashtags(Platform::Flipkart, None, "Laptop stand", 10, 0);
        assert_eq!(tags[2], "#TechDeals");
    }

    #[test]
    fn test_render_layout() {
        let body = render_body(
            Platform::Myntra,
            "Cotton kurta set",
            Some(Price(dec!(799))),
            Discount::new(60),
            "https://www.myntra.com/12345678",
        );
        assert_eq!(
            body,
            "👕 Myntra\nCotton kurta set\n💰 ₹799\n🎯 60%\n\nhttps://www.myntra.com/12345678"
        );
        let text = render(&body, &["#MyntraDeals", "#MorningDeals"]);
        assert!(text.ends_with("\n\n#MyntraDeals #MorningDeals"));
    }
}

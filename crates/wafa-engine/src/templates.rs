//! # Notification Templates
//!
//! Bilingual (Arabic/English) message templates, one per notification
//! kind. The worker feeds an outbox payload in and gets a rendered
//! subject/body pair out; both languages ship in the same email.

use wafa_core::{NotificationKind, NotificationPayload};

/// A rendered, ready-to-send message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Renders the template for `kind` with the payload's variables.
///
/// Missing payload fields degrade to neutral wording rather than
/// failing: a notification with an incomplete payload is still worth
/// more than a crashed delivery.
pub fn render(kind: NotificationKind, payload: &NotificationPayload) -> RenderedMessage {
    let name_en = payload.customer_name.as_deref().unwrap_or("there");
    let name_ar = payload.customer_name.as_deref().unwrap_or("عميلنا العزيز");
    let points = payload.points.unwrap_or(0);
    let balance = payload.balance.unwrap_or(0);

    match kind {
        NotificationKind::PointsEarned => RenderedMessage {
            subject: format!("You earned {points} points! | لقد كسبت {points} نقطة!"),
            body: format!(
                "Hi {name_en},\n\n\
                 You just earned {points} loyalty points. Your balance is now {balance} points.\n\n\
                 مرحباً {name_ar}،\n\n\
                 لقد كسبت {points} نقطة ولاء. رصيدك الآن {balance} نقطة.\n"
            ),
        },
        NotificationKind::Birthday => RenderedMessage {
            subject: format!("Happy birthday! {points} points for you | عيد ميلاد سعيد!"),
            body: format!(
                "Happy birthday, {name_en}!\n\n\
                 We added {points} loyalty points to your account as a gift. \
                 Your balance is now {balance} points.\n\n\
                 عيد ميلاد سعيد {name_ar}!\n\n\
                 أضفنا {points} نقطة ولاء إلى حسابك كهدية. رصيدك الآن {balance} نقطة.\n"
            ),
        },
        NotificationKind::ReferralShare => RenderedMessage {
            subject: format!("Thanks for sharing! +{points} points | شكراً لمشاركتك!"),
            body: format!(
                "Hi {name_en},\n\n\
                 Thanks for spreading the word! You earned {points} points for sharing. \
                 Your balance is now {balance} points.\n\n\
                 مرحباً {name_ar}،\n\n\
                 شكراً لنشر الكلمة! لقد كسبت {points} نقطة للمشاركة. رصيدك الآن {balance} نقطة.\n"
            ),
        },
        NotificationKind::CouponIssued => {
            let code = payload.coupon_code.as_deref().unwrap_or("—");
            let reward = payload.reward_name.as_deref().unwrap_or("a reward");
            let expiry = payload
                .expires_at
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "soon".to_string());
            RenderedMessage {
                subject: format!("Your reward is here: {code} | وصلت مكافأتك!"),
                body: format!(
                    "Hi {name_en},\n\n\
                     Your points unlocked {reward}. Use code {code} before {expiry}.\n\n\
                     مرحباً {name_ar}،\n\n\
                     نقاطك فتحت لك {reward}. استخدم الكود {code} قبل {expiry}.\n"
                ),
            }
        }
        NotificationKind::PointsDeducted => RenderedMessage {
            subject: format!("{points} points were deducted | تم خصم {points} نقطة"),
            body: format!(
                "Hi {name_en},\n\n\
                 {points} points were deducted from your account following an order change. \
                 Your balance is now {balance} points.\n\n\
                 مرحباً {name_ar}،\n\n\
                 تم خصم {points} نقطة من حسابك بسبب تغيير في الطلب. رصيدك الآن {balance} نقطة.\n"
            ),
        },
        NotificationKind::MissingRewardRule => {
            let store = payload.merchant_name.as_deref().unwrap_or("your store");
            RenderedMessage {
                subject: "Action needed: no active reward rule | مطلوب إجراء: لا توجد مكافأة مفعلة"
                    .to_string(),
                body: format!(
                    "Customers of {store} are earning points, but no active reward rule \
                     exists, so no coupons can be issued. Please configure a reward in the \
                     loyalty settings.\n\n\
                     عملاء {store} يكسبون نقاطاً، لكن لا توجد قاعدة مكافأة مفعلة، لذلك لا يمكن \
                     إصدار كوبونات. يرجى إعداد مكافأة في إعدادات الولاء.\n"
                ),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

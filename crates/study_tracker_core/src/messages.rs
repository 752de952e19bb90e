//! crates/study_tracker_core/src/messages.rs
//!
//! User-facing copy for replies and reminders.

pub const ONBOARDING_PROMPT: &str =
    "こんにちは！毎日いくつのセクションを進めますか？数字で教えてください！";
pub const TARGET_MUST_BE_NUMERIC: &str = "数字で教えてください🙏";
pub const TARGET_MUST_BE_POSITIVE: &str = "1以上の数字で教えてください🙏";
pub const REST_DAY_ACK: &str = "了解です！今日はゆっくり休んでください😊";
pub const TARGET_MET: &str = "今日の報告はこれで完了です！お疲れさまでした💮";
pub const SECTIONS_OUT_OF_RANGE: &str = "1〜50の数字で入力してください🙏";
pub const NUMERIC_ONLY: &str = "数字か「休養日」で入力してください！";

pub const UNCHECKED_NOTICE: &str = "昨日、報告が確認できませんでした。あなたが努力を怠ると、誰よりも早く成績に出ます。本日は必ず達成し、報告しなさい。";
pub const MIDDAY_REMINDER: &str = "本日の報告、お待ちしております。終わったら教えてくださいね。";

pub fn target_registered(target: u32) -> String {
    format!("登録しました！目標は 1日 {target} セクションですね📚")
}

pub fn recorded(count: usize, target: u32) -> String {
    format!("記録しました！（{count}/{target}）")
}

pub fn over_achieved(count: usize, target: u32) -> String {
    format!("目標を超えて達成です！素晴らしい🔥（{count}/{target}）")
}

pub fn late_reminder(remaining: u32) -> String {
    format!("もうすぐ今日が終わります！残り {remaining} 件の報告がまだです📣")
}

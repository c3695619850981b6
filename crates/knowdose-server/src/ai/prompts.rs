//! Prompt templates for the generative model.

use knowdose_core::{Language, LocalizedText, MealTimes};
use serde_json::Value;

use crate::config::PromptVersion;

/// System instruction for free-text questions.
pub fn system_prompt(lang: Language) -> &'static str {
    match lang {
        Language::Zh => "你是一个专业的医疗助手，请用中文回答，保持专业、客观、简洁。",
        Language::En => {
            "You are a professional medical assistant. Respond in English, professionally and concisely."
        }
    }
}

const ZH_BASIC_FIELDS: &str = "提取 JSON：1.medicationName{zh,en} 2.dailyFrequency \
3.timingInstruction{zh,en} 4.isVitamin 5.summary(中文) 6.calculatedTimes(['HH:MM',...])";

const ZH_EXTENDED_FIELDS: &str = " 7.dosage(容量/规格, e.g. \"500mg\") \
8.dosageInferred(Boolean,若标签无明显规格则是AI推断的) \
9.postMedicationWindow(分钟,整数,无则0; 例如\"服药后30分钟不可进食\"则30. 若标签未提及但根据医学常识需要(如某些抗生素),请推断并填入) \
10.postMedicationWindowInferred(Boolean,若标签未提及则是AI根据医学常识推断的) \
11.safetyInstruction{zh,en}(简短安全提示). \
12.safetyInstructionInferred(Boolean,若标签未提及则是AI推断的). \
13.scheduleOptions(候选服药方案数组, 每项{label{zh,en}, times['HH:MM',...]}, 结合三餐时间并避开现有药物时间).";

const EN_BASIC_FIELDS: &str = "Return JSON fields: medicationName {zh,en}, dailyFrequency, \
timingInstruction {zh,en}, isVitamin, summary(English), calculatedTimes ['HH:MM',...]";

const EN_EXTENDED_FIELDS: &str = ", dosage(string, e.g. \"500mg\"), \
dosageInferred(boolean, true if inferred/not distinct), \
postMedicationWindow(minutes, integer, 0 if none. If label missing but medical knowledge suggests it, infer it.), \
postMedicationWindowInferred(boolean, true if inferred from medical knowledge), \
safetyInstruction {zh,en} (short warning), \
safetyInstructionInferred(boolean, true if inferred), \
scheduleOptions (array of candidate schedules, each {label {zh,en}, times ['HH:MM',...]}, aligned with meal times and avoiding existing medication times).";

/// Renders existing medications as `name: t1,t2` joined by `; `.
///
/// The name is taken in `lang`, falling back to the other language; entries
/// without any usable name render with an empty name.
pub fn describe_existing(meds: &[Value], lang: Language) -> String {
    meds.iter()
        .map(|med| {
            let name = med
                .get("medicationName")
                .and_then(LocalizedText::from_value)
                .and_then(|text| text.resolve(lang).map(str::to_string))
                .unwrap_or_default();
            let times = med
                .get("times")
                .and_then(Value::as_array)
                .map(|times| {
                    times
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            format!("{name}: {times}")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Prompt for medication label analysis.
pub fn analysis_prompt(
    version: PromptVersion,
    lang: Language,
    meal_times: &MealTimes,
    existing: &[Value],
) -> String {
    let existing = describe_existing(existing, lang);
    match (lang, version) {
        (Language::Zh, version) => {
            let mut prompt = format!(
                "分析药物标签。用户三餐时间：早餐{}, 午餐{}, 晚餐{}。现有药物时间：{}。{}",
                meal_times.breakfast, meal_times.lunch, meal_times.dinner, existing, ZH_BASIC_FIELDS
            );
            match version {
                PromptVersion::Basic => prompt.push('。'),
                PromptVersion::Extended => prompt.push_str(ZH_EXTENDED_FIELDS),
            }
            prompt
        }
        (Language::En, version) => {
            let mut prompt = format!(
                "Analyze the medication label image. Meal times: breakfast {}, lunch {}, dinner {}. Existing meds: {}. {}",
                meal_times.breakfast, meal_times.lunch, meal_times.dinner, existing, EN_BASIC_FIELDS
            );
            match version {
                PromptVersion::Basic => prompt.push('.'),
                PromptVersion::Extended => prompt.push_str(EN_EXTENDED_FIELDS),
            }
            prompt
        }
    }
}

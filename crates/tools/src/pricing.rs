//! Subscription pricing calculator.
//!
//! Flat per-user monthly rates; the plan name has already been normalized
//! by schema validation.

use serde_json::{Map, Value, json};
use supportdesk_core::error::ToolError;
use supportdesk_core::tool::{FieldKind, FieldSpec, SideEffect, ToolSchema};

use crate::ToolOutput;

pub const NAME: &str = "calculate_pricing";

/// Monthly price per user, in whole dollars.
pub const PLANS: &[(&str, u64)] = &[("basic", 10), ("pro", 20), ("enterprise", 40)];

pub fn schema() -> ToolSchema {
    let plans: Vec<&str> = PLANS.iter().map(|(p, _)| *p).collect();
    ToolSchema {
        name: NAME.into(),
        description: "Calculate the monthly subscription cost from the number of users and the \
                      plan type: 'basic' ($10/user), 'pro' ($20/user) or 'enterprise' ($40/user). \
                      Use this whenever the customer asks about pricing or costs."
            .into(),
        side_effect: SideEffect::PureQuery,
        fields: vec![
            FieldSpec::required("number_of_users", FieldKind::Integer, "Number of users").at_least(1),
            FieldSpec::required("plan_type", FieldKind::String, "Plan type").one_of(&plans),
        ],
    }
}

pub fn execute(args: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
    let failed = |reason: &str| ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason: reason.into(),
    };

    let users = args
        .get("number_of_users")
        .and_then(Value::as_u64)
        .ok_or_else(|| failed("number_of_users must be a positive integer"))?;
    let plan = args
        .get("plan_type")
        .and_then(Value::as_str)
        .ok_or_else(|| failed("plan_type is missing"))?;
    let price = price_per_user(plan).ok_or_else(|| failed("unknown plan"))?;
    let total = users
        .checked_mul(price)
        .ok_or_else(|| failed("number_of_users is too large"))?;

    let text = format!(
        "Pricing Calculation:\n\
         Plan: {}\n\
         Number of Users: {users}\n\
         Price per User: ${price}/month\n\
         Total Monthly Cost: ${total}/month",
        capitalize(plan)
    );

    Ok(ToolOutput {
        text,
        data: Some(json!({
            "plan": plan,
            "users": users,
            "price_per_user": price,
            "total_monthly": total,
        })),
    })
}

pub fn price_per_user(plan: &str) -> Option<u64> {
    PLANS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(plan))
        .map(|(_, price)| *price)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: Value) -> Result<ToolOutput, ToolError> {
        let validated = schema().validate(&args)?;
        execute(&validated)
    }

    #[test]
    fn pro_plan_for_ten_users() {
        let out = run(json!({"number_of_users": 10, "plan_type": "pro"})).unwrap();
        assert_eq!(
            out.text,
            "Pricing Calculation:\nPlan: Pro\nNumber of Users: 10\n\
             Price per User: $20/month\nTotal Monthly Cost: $200/month"
        );
        assert_eq!(out.data.unwrap()["total_monthly"], json!(200));
    }

    #[test]
    fn plan_name_is_case_insensitive() {
        let out = run(json!({"number_of_users": 3, "plan_type": "Enterprise"})).unwrap();
        assert!(out.text.contains("Total Monthly Cost: $120/month"));
    }

    #[test]
    fn zero_users_is_rejected_before_execution() {
        let err = run(json!({"number_of_users": 0, "plan_type": "basic"})).unwrap_err();
        assert!(matches!(err, ToolError::SchemaValidation { .. }));
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let err = run(json!({"number_of_users": 2, "plan_type": "platinum"})).unwrap_err();
        assert!(err.to_string().contains("basic, pro, enterprise"));
    }

    #[test]
    fn price_table() {
        assert_eq!(price_per_user("basic"), Some(10));
        assert_eq!(price_per_user("PRO"), Some(20));
        assert_eq!(price_per_user("free"), None);
    }
}

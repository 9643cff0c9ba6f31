use serde::Serialize;
use std::fmt;

/// A bookkeeping expense category. Codes are opaque to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpenseCategory {
    pub code: &'static str,
    pub name: &'static str,
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.name)
    }
}

impl ExpenseCategory {
    pub fn lookup(code: &str) -> Option<&'static ExpenseCategory> {
        EXPENSE_CATEGORIES.iter().find(|c| c.code == code)
    }
}

pub const UNCLASSIFIED_NAME: &str = "未分類";

pub const EXPENSE_CATEGORIES: &[ExpenseCategory] = &[
    ExpenseCategory { code: "350", name: "役員借入金" },
    ExpenseCategory { code: "316", name: "預り金1(源泉)" },
    ExpenseCategory { code: "317", name: "預り金2(市県民税)" },
    ExpenseCategory { code: "716", name: "法定福利費" },
    ExpenseCategory { code: "717", name: "福利厚生費" },
    ExpenseCategory { code: "718", name: "広告宣伝費" },
    ExpenseCategory { code: "722", name: "旅費交通費" },
    ExpenseCategory { code: "727", name: "交際費" },
    ExpenseCategory { code: "737", name: "会議費" },
    ExpenseCategory { code: "723", name: "燃料費" },
    ExpenseCategory { code: "724", name: "通信費" },
    ExpenseCategory { code: "725", name: "水道光熱費" },
    ExpenseCategory { code: "726", name: "租税公課" },
    ExpenseCategory { code: "728", name: "消耗品費" },
    ExpenseCategory { code: "729", name: "事務用品費" },
    ExpenseCategory { code: "738", name: "リース料" },
    ExpenseCategory { code: "732", name: "修繕費" },
    ExpenseCategory { code: "733", name: "保険料" },
    ExpenseCategory { code: "734", name: "支払手数料" },
    ExpenseCategory { code: "739", name: "諸会費" },
    ExpenseCategory { code: "741", name: "新聞図書費" },
    ExpenseCategory { code: "743", name: "報酬手当" },
    ExpenseCategory { code: "744", name: "地代家賃" },
    ExpenseCategory { code: "745", name: "雑費" },
];

/// Display name for a category code, or `未分類` when the code is unknown.
pub fn category_name(code: &str) -> &'static str {
    ExpenseCategory::lookup(code)
        .map(|c| c.name)
        .unwrap_or(UNCLASSIFIED_NAME)
}

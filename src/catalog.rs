//! The planted-defect catalog.
//!
//! Built once at startup and handed to whoever needs it; never mutated.

use serde::Serialize;

/// A named, intentionally introduced bug with its expected fix narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefectRecord {
    pub name: String,
    pub description: String,
    /// Relative, `/`-separated paths inside the target codebase.
    pub affected_paths: Vec<String>,
    pub root_cause: String,
    pub fix_summary: String,
    /// Defect-specific hints for the model: what to change and what to leave alone.
    pub guidance: Option<String>,
}

impl DefectRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        affected_paths: &[&str],
        root_cause: impl Into<String>,
        fix_summary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            affected_paths: affected_paths.iter().map(|p| p.to_string()).collect(),
            root_cause: root_cause.into(),
            fix_summary: fix_summary.into(),
            guidance: None,
        }
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }
}

/// Ordered list of defects; names are unique.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<DefectRecord>,
}

impl Catalog {
    /// Later records with an already-seen name are dropped.
    pub fn new(records: Vec<DefectRecord>) -> Self {
        let mut unique: Vec<DefectRecord> = Vec::with_capacity(records.len());
        for record in records {
            if unique.iter().any(|r| r.name == record.name) {
                tracing::warn!(defect = %record.name, "duplicate defect name dropped from catalog");
                continue;
            }
            unique.push(record);
        }
        Self { records: unique }
    }

    pub fn find(&self, name: &str) -> Option<&DefectRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn records(&self) -> &[DefectRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The five bugs planted in the todo application.
pub fn planted_defects() -> Catalog {
    Catalog::new(vec![
        DefectRecord::new(
            "State Management Bug",
            "Todo items don't update in the UI after editing. The `handleUpdate` function in `TodoList.tsx` makes an API call but never updates the local `todos` state with the returned data.",
            &["frontend/src/components/TodoList.tsx"],
            "Missing state update after successful API call to reflect changes locally.",
            "Update the local `todos` state array with the response from the `updateTodo` API call to ensure UI consistency.",
        )
        .with_guidance(
            "- Only touch `handleUpdate`: after `await updateTodo(...)` resolves, map over `todos` and replace the item whose `id` matches with the returned todo.\n\
             - Use the functional form `setTodos(prev => ...)` so concurrent edits are not lost.\n\
             - Do NOT change `fetchTodos`, the `useEffect` hook, or any JSX.",
        ),
        DefectRecord::new(
            "CSRF Token Bug",
            "POST, PUT, and DELETE requests are failing due to a missing `X-CSRFToken` header. The `apiCall` helper in `api.ts` needs to include the CSRF token for mutating requests.",
            &["frontend/src/services/api.ts"],
            "Django's CSRF protection blocks mutating requests without the `X-CSRFToken` header, which was missing in `api.ts`.",
            "In `apiCall` in `api.ts`, add the `X-CSRFToken` header for 'POST', 'PUT', and 'DELETE' methods by retrieving the token from the cookie.",
        )
        .with_guidance(
            "- Read the `csrftoken` cookie from `document.cookie`; add a small local helper only if none exists.\n\
             - Attach the header only for POST, PUT, PATCH and DELETE; leave GET requests unchanged.\n\
             - Do NOT change the signature of `apiCall` or any exported function.",
        ),
        DefectRecord::new(
            "Permission Bug",
            "Users can see todos from other users. The `get_queryset` method in the `TodoViewSet` should filter todos by the currently authenticated user.",
            &["backend/todos/views.py"],
            "The `get_queryset` method in `TodoViewSet` was not filtering todos by the authenticated user, leading to data exposure.",
            "Modify `get_queryset` in `TodoViewSet` to filter `Todo` objects by `self.request.user` to ensure users only see their own todos.",
        )
        .with_guidance(
            "- Change only the body of `get_queryset` to `Todo.objects.filter(user=self.request.user)`.\n\
             - Keep any existing ordering.\n\
             - Do NOT modify `perform_create`, serializers, permissions classes or URL routing.",
        ),
        DefectRecord::new(
            "React useEffect Bug",
            "An infinite loop occurs in `TodoList.tsx` because the `useEffect` hook that calls `fetchTodos` is missing a dependency array, causing it to run on every component render.",
            &["frontend/src/components/TodoList.tsx"],
            "The `useEffect` hook in `TodoList.tsx` lacked a dependency array, causing `fetchTodos` to be called on every render, leading to an infinite loop.",
            "Add an empty dependency array (`[]`) to the `useEffect` hook in `TodoList.tsx` to ensure `fetchTodos` runs only once on component mount.",
        )
        .with_guidance(
            "- The only change is adding `[]` as the second argument of the `useEffect` call that invokes `fetchTodos`.\n\
             - Do NOT move `fetchTodos` or wrap it in `useCallback`.\n\
             - Do NOT touch `handleUpdate` or the state declarations.",
        ),
        DefectRecord::new(
            "API Integration Bug",
            "Field name mismatch between frontend and backend. The Django serializer sends `completed` and `created_at`, but the React interface expects `is_completed` and `created`.",
            &["backend/todos/serializers.py"],
            "The Django `TodoSerializer` uses field names (`completed`, `created_at`) that do not align with the field names expected by the React frontend (`is_completed`, `created`), causing integration issues.",
            "In `backend/todos/serializers.py`, map the backend fields `completed` and `created_at` to `is_completed` and `created` respectively, using `serializers.BooleanField(source='completed')` and `serializers.DateTimeField(source='created_at')` in `TodoSerializer`.",
        )
        .with_guidance(
            "- Fix this on the backend only; do NOT edit the React `Todo` interface.\n\
             - Declare `is_completed` and `created` as explicit serializer fields with `source=` and update `Meta.fields` accordingly.\n\
             - `created` must stay read-only.",
        ),
    ])
}
